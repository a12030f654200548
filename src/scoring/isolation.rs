//! Seeded isolation forest.
//!
//! Tree `i` draws from its own ChaCha stream `(seed, i)`, so a fitted forest
//! depends only on the seed and the data, never on how many threads built it.

use nalgebra::DMatrix;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::IsolationConfig;
use crate::features::worker_pool;

use super::standardize::StandardizedFeatures;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as an arena; node 0 is the root.
#[derive(Debug, Clone)]
pub struct IsolationTree {
    nodes: Vec<TreeNode>,
}

impl IsolationTree {
    fn fit(data: &DMatrix<f64>, sample: Vec<usize>, height_limit: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, sample, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &DMatrix<f64>,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|c| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[(r, c)];
                    (lo.min(v), hi.max(v))
                });
                (lo < hi).then_some((c, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[(r, feature)] <= threshold);

        let left = self.grow(data, left_rows, depth + 1, height_limit, rng);
        let right = self.grow(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Depth at which `row` lands, plus the expected remaining depth of its leaf.
    fn path_length(&self, data: &DMatrix<f64>, row: usize) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if data[(row, *feature)] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                TreeNode::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    seed: u64,
    sample_size: usize,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn new(config: &IsolationConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            seed: config.seed,
            sample_size: 0,
            trees: Vec::new(),
        }
    }

    /// Fit every tree on its own subsample of `data`, in parallel on `pool`.
    pub fn fit(&mut self, data: &DMatrix<f64>, pool: &rayon::ThreadPool) {
        let n = data.nrows();
        self.sample_size = self.max_samples.min(n);
        if self.sample_size == 0 {
            self.trees.clear();
            return;
        }
        let height_limit = (self.sample_size as f64).log2().ceil() as usize;
        let (seed, sample_size) = (self.seed, self.sample_size);

        self.trees = pool.install(|| {
            (0..self.n_estimators)
                .into_par_iter()
                .map(|i| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rng.set_stream(i as u64);
                    let sample = index::sample(&mut rng, n, sample_size).into_vec();
                    IsolationTree::fit(data, sample, height_limit, &mut rng)
                })
                .collect()
        });
        tracing::debug!(trees = self.trees.len(), sample_size, height_limit, "Fitted isolation forest");
    }

    /// `2^(-E[h(x)] / c(psi))` per row: higher means easier to isolate.
    pub fn score_samples(&self, data: &DMatrix<f64>, pool: &rayon::ThreadPool) -> Vec<f64> {
        let normalizer = average_path_length(self.sample_size);
        if self.trees.is_empty() || normalizer == 0.0 {
            return vec![0.5; data.nrows()];
        }
        pool.install(|| {
            (0..data.nrows())
                .into_par_iter()
                .map(|row| {
                    let total: f64 = self.trees.iter().map(|t| t.path_length(data, row)).sum();
                    let mean = total / self.trees.len() as f64;
                    2f64.powf(-mean / normalizer)
                })
                .collect()
        })
    }
}

/// Fit a forest on the standardized features and score the same rows.
pub fn isolation_scores(features: &StandardizedFeatures, config: &IsolationConfig) -> eyre::Result<Vec<f64>> {
    let pool = worker_pool(config.workers, "iforest")?;
    let mut forest = IsolationForest::new(config);
    forest.fit(&features.matrix, &pool);
    let scores = forest.score_samples(&features.matrix, &pool);
    tracing::info!(
        rows = scores.len(),
        trees = config.n_estimators,
        seed = config.seed,
        "Computed isolation forest scores"
    );
    Ok(scores)
}
