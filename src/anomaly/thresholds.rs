use serde::{Deserialize, Serialize};

use crate::features::table::{AccountMetrics, FeatureTable};

/// Per-feature top-quantile cutoffs over the non-infra population.
///
/// A `None` cutoff means the population was empty (for loop features: nobody
/// participates in any loop) and comparisons against it never fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub quantile: f64,
    pub unique_in_degree: Option<f64>,
    pub unique_out_degree: Option<f64>,
    pub two_node_loop_amount: Option<f64>,
    pub two_node_loop_tx_count: Option<f64>,
    pub triangle_loop_amount: Option<f64>,
    pub triangle_loop_tx_count: Option<f64>,
}

impl ThresholdTable {
    /// Compute cutoffs at `quantile` from the non-infra rows of `table`.
    /// Loop amount and tx-count cutoffs ignore exact zeros.
    pub fn compute(table: &FeatureTable, quantile: f64) -> Self {
        let metrics: Vec<AccountMetrics> = table
            .rows
            .iter()
            .filter(|r| !r.is_infra)
            .map(|r| r.metrics())
            .collect();

        let all = |f: fn(&AccountMetrics) -> f64| -> Vec<f64> { metrics.iter().map(f).collect() };
        let nonzero = |f: fn(&AccountMetrics) -> f64| -> Vec<f64> {
            metrics.iter().map(f).filter(|v| *v != 0.0).collect()
        };

        let thresholds = Self {
            quantile,
            unique_in_degree: quantile_linear(all(|m| m.unique_in_degree), quantile),
            unique_out_degree: quantile_linear(all(|m| m.unique_out_degree), quantile),
            two_node_loop_amount: quantile_linear(nonzero(|m| m.two_node_loop_amount), quantile),
            two_node_loop_tx_count: quantile_linear(nonzero(|m| m.two_node_loop_tx_count), quantile),
            triangle_loop_amount: quantile_linear(nonzero(|m| m.triangle_loop_amount), quantile),
            triangle_loop_tx_count: quantile_linear(nonzero(|m| m.triangle_loop_tx_count), quantile),
        };

        tracing::info!(
            population = metrics.len(),
            quantile,
            in_degree = ?thresholds.unique_in_degree,
            out_degree = ?thresholds.unique_out_degree,
            "Computed rule thresholds"
        );
        thresholds
    }
}

/// Quantile with linear interpolation between closest ranks. `None` when empty.
pub fn quantile_linear(mut values: Vec<f64>, q: f64) -> Option<f64> {
    values.retain(|v| !v.is_nan());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}
