use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chainwatch_anomaly::config::Config;
use chainwatch_anomaly::pipeline::BatchPipeline;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for per-row detail)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("ChainWatch anomaly scorer starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        batches = config.batches.len(),
        "Configuration loaded from {}",
        config_path
    );

    // Build the exclusion set once; batches share the pipeline read-only
    let batches = config.batches.clone();
    let pipeline = Arc::new(BatchPipeline::init(config)?);

    // Create shutdown signal
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received, stopping after the current stage...");
                shutdown.cancel();
            }
        });
    }

    // Spawn one blocking task per batch
    let mut handles = Vec::new();
    for batch in batches {
        let pipeline = pipeline.clone();
        let shutdown = shutdown.clone();
        let label = format!("{} {:04}-{:02}", batch.chain, batch.year, batch.month);

        let handle = tokio::task::spawn_blocking(move || pipeline.run(&batch, &shutdown));
        handles.push((label, handle));
    }

    let mut failed = 0usize;
    for (label, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => tracing::info!(
                batch = %label,
                accounts = report.accounts,
                flagged = report.flagged,
                "Batch finished"
            ),
            Ok(Err(e)) => {
                failed += 1;
                tracing::error!(batch = %label, error = %e, "Batch failed");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(batch = %label, error = %e, "Batch task panicked");
            }
        }
    }

    if failed > 0 {
        return Err(eyre::eyre!("{} batch(es) failed", failed));
    }
    tracing::info!("ChainWatch anomaly scorer finished");
    Ok(())
}
