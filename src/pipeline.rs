use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::anomaly::engine::RuleEngine;
use crate::anomaly::thresholds::ThresholdTable;
use crate::artifacts::{ArtifactKind, ArtifactStore, BatchKey};
use crate::config::{BatchConfig, Config};
use crate::entity::infra::ExclusionSet;
use crate::features::table::{AccountMetrics, FeatureTable};
use crate::features::{degree, egonet, motif, worker_pool};
use crate::graph::builder::build_graph;
use crate::graph::types::{ExcludedNodes, GraphArtifact, TransferGraph};
use crate::scoring::agreement::agreement_report;
use crate::scoring::combiner::{combine_scores, top_accounts, write_results_csv};
use crate::scoring::isolation::isolation_scores;
use crate::scoring::standardize::StandardizedFeatures;
use crate::scoring::statistical::mahalanobis_distances;
use crate::transfer::filter::filter_transfers;
use crate::transfer::loader::{load_transfers_csv, write_transfers_csv};
use crate::transfer::types::TransferRecord;

/// Summary of one completed batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub accounts: usize,
    pub scored: usize,
    pub infra: usize,
    pub flagged: usize,
    /// Hubs skipped during triangle enumeration (0 when features were resumed).
    pub capped_nodes: usize,
    pub result_path: PathBuf,
}

/// Runs one (chain, year, month) batch through every stage:
/// 1. Transfer stream -> filtered edge list
/// 2. Aggregated graph
/// 3. Degree, motif and egonet features
/// 4. Thresholds and rule flags
/// 5. Mahalanobis and isolation scores
/// 6. Combined scores and agreement report
///
/// Each stage's output is persisted before the next starts; with `resume`
/// the batch restarts from the latest artifact on disk.
pub struct BatchPipeline {
    config: Config,
    store: ArtifactStore,
    exclusions: Arc<ExclusionSet>,
}

impl BatchPipeline {
    /// Initialize the pipeline: build the infra exclusion set and artifact store.
    pub fn init(config: Config) -> eyre::Result<Self> {
        let exclusions = ExclusionSet::from_config(&config.infra)?;
        Ok(Self::with_exclusions(config, Arc::new(exclusions)))
    }

    pub fn with_exclusions(config: Config, exclusions: Arc<ExclusionSet>) -> Self {
        let store = ArtifactStore::new(&config.data.output_dir);
        Self {
            config,
            store,
            exclusions,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn run(&self, batch: &BatchConfig, cancel: &CancellationToken) -> eyre::Result<BatchReport> {
        let key = BatchKey::from_config(batch)?;
        tracing::info!(batch = %key, resume = self.config.data.resume, "Starting batch");

        let (table, capped_nodes) = self.features(&key, batch, cancel)?;
        checkpoint(cancel, &key, "thresholds")?;

        // Step 4: thresholds and rules
        let thresholds = ThresholdTable::compute(&table, self.config.rules.quantile);
        self.store
            .write_json(&key, ArtifactKind::Thresholds, &thresholds)?;
        let engine = RuleEngine::new(thresholds, self.config.rules.clone());
        let outcomes = engine.evaluate_table(&table);
        checkpoint(cancel, &key, "statistical scoring")?;

        // Step 5: detectors over the non-infra population
        let metrics: Vec<AccountMetrics> = table
            .rows
            .iter()
            .filter(|r| !r.is_infra)
            .map(|r| r.metrics())
            .collect();
        let standardized = StandardizedFeatures::from_metrics(&metrics);
        let distances = mahalanobis_distances(&standardized)?;
        checkpoint(cancel, &key, "isolation scoring")?;
        let iforest = isolation_scores(&standardized, &self.config.isolation)?;
        checkpoint(cancel, &key, "score combination")?;

        // Step 6: combine, persist, report
        let accounts = combine_scores(&table, &outcomes, &distances, &iforest)?;
        let result_path = self.store.write_with(&key, ArtifactKind::AnalysisResult, |w| {
            write_results_csv(&accounts, w)
        })?;
        let agreement = agreement_report(&accounts);
        self.store
            .write_json(&key, ArtifactKind::Agreement, &agreement)?;

        for (rank, account) in top_accounts(&accounts, 10).iter().enumerate() {
            tracing::info!(
                batch = %key,
                rank = rank + 1,
                address = %account.address,
                score = account.final_score_0_100.unwrap_or(0.0),
                "Top anomalous account"
            );
        }

        let report = BatchReport {
            accounts: accounts.len(),
            scored: metrics.len(),
            infra: accounts.len() - metrics.len(),
            flagged: outcomes.iter().flatten().filter(|o| o.raw_score() > 0).count(),
            capped_nodes,
            result_path,
        };
        tracing::info!(
            batch = %key,
            accounts = report.accounts,
            scored = report.scored,
            flagged = report.flagged,
            path = %report.result_path.display(),
            "Batch complete"
        );
        Ok(report)
    }

    /// Feature table for the batch, resumed from disk when allowed.
    fn features(
        &self,
        key: &BatchKey,
        batch: &BatchConfig,
        cancel: &CancellationToken,
    ) -> eyre::Result<(FeatureTable, usize)> {
        if self.resumable(key, ArtifactKind::Features) {
            let path = self.store.path(key, ArtifactKind::Features);
            tracing::info!(batch = %key, path = %path.display(), "Resuming from feature table");
            return Ok((FeatureTable::read_csv(&path)?, 0));
        }

        let graph = self.graph(key, batch, cancel)?;
        checkpoint(cancel, key, "feature extraction")?;

        // Step 3: per-node features on a dedicated pool
        let excluded = ExcludedNodes::from_set(&graph, &self.exclusions);
        let cap = self.config.extraction.triangle_cap();
        let pool = worker_pool(self.config.extraction.workers, "extract")?;
        let (degree, motifs, egonets) = pool.install(|| {
            (
                degree::extract_degree_features(&graph, &excluded),
                motif::extract_motif_features(&graph, &excluded, cap),
                egonet::extract_egonet_features(&graph, &excluded),
            )
        });

        let capped_nodes = motifs.diagnostics.capped_nodes.len();
        for &node in motifs.diagnostics.capped_nodes.iter().take(20) {
            tracing::warn!(batch = %key, address = %graph.address(node), "Triangle enumeration skipped hub");
        }

        let table = FeatureTable::merge(&graph, &excluded, degree, motifs.features, egonets)?;
        self.store
            .write_with(key, ArtifactKind::Features, |w| table.write_csv(w))?;
        Ok((table, capped_nodes))
    }

    fn graph(&self, key: &BatchKey, batch: &BatchConfig, cancel: &CancellationToken) -> eyre::Result<TransferGraph> {
        if self.resumable(key, ArtifactKind::Graph) {
            tracing::info!(batch = %key, "Resuming from persisted graph");
            let artifact: GraphArtifact = self.store.read_json(key, ArtifactKind::Graph)?;
            return TransferGraph::from_artifact(artifact);
        }

        let transfers = self.edge_list(key, batch)?;
        checkpoint(cancel, key, "graph construction")?;

        // Step 2: aggregate
        let graph = build_graph(&transfers)?;
        self.store
            .write_json(key, ArtifactKind::Graph, &graph.to_artifact())?;
        Ok(graph)
    }

    fn edge_list(&self, key: &BatchKey, batch: &BatchConfig) -> eyre::Result<Vec<TransferRecord>> {
        if self.resumable(key, ArtifactKind::EdgeList) {
            tracing::info!(batch = %key, "Resuming from filtered edge list");
            return load_transfers_csv(&self.store.path(key, ArtifactKind::EdgeList));
        }

        // Step 1: load and filter the raw stream
        let source = match &batch.transfers_path {
            Some(path) => PathBuf::from(path),
            None => key.transfers_path(Path::new(&self.config.data.input_dir)),
        };
        let transfers = filter_transfers(load_transfers_csv(&source)?, &self.config.filter);
        self.store
            .write_with(key, ArtifactKind::EdgeList, |w| write_transfers_csv(&transfers, w))?;
        Ok(transfers)
    }

    fn resumable(&self, key: &BatchKey, kind: ArtifactKind) -> bool {
        self.config.data.resume && self.store.exists(key, kind)
    }
}

fn checkpoint(cancel: &CancellationToken, key: &BatchKey, next_stage: &str) -> eyre::Result<()> {
    if cancel.is_cancelled() {
        return Err(eyre::eyre!("Batch {} cancelled before {}", key, next_stage));
    }
    Ok(())
}
