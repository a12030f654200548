pub mod degree;
pub mod egonet;
pub mod motif;
pub mod table;

/// Build a rayon pool with `workers` threads; 0 keeps rayon's default of one
/// thread per core.
pub fn worker_pool(workers: usize, name: &'static str) -> eyre::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("{}-{}", name, i))
        .build()
        .map_err(|e| eyre::eyre!("Failed to build {} worker pool: {}", name, e))
}
