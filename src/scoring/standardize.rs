//! Log and z-score preprocessing shared by the statistical and isolation
//! scorers.

use nalgebra::DMatrix;

use crate::features::table::AccountMetrics;

/// Column order of the standardized matrix.
pub const STANDARDIZED_FEATURES: [&str; 9] = [
    "unique_in_degree_log_z",
    "unique_out_degree_log_z",
    "total_input_amount_log_z",
    "total_output_amount_log_z",
    "two_node_loop_count_log_z",
    "triangle_loop_count_log_z",
    "log_degree_ratio_z",
    "log_amount_ratio_z",
    "egonet_density_z",
];

/// Standardized features of the scored population: one row per account.
///
/// Zero-variance columns are kept as all-zero columns and flagged, so the
/// isolation forest sees the same shape while Mahalanobis can drop them.
#[derive(Debug, Clone)]
pub struct StandardizedFeatures {
    pub matrix: DMatrix<f64>,
    pub zero_variance: Vec<bool>,
}

impl StandardizedFeatures {
    pub fn from_metrics(metrics: &[AccountMetrics]) -> Self {
        let raw: [Vec<f64>; 9] = [
            metrics.iter().map(|m| m.unique_in_degree.ln_1p()).collect(),
            metrics.iter().map(|m| m.unique_out_degree.ln_1p()).collect(),
            metrics.iter().map(|m| m.total_input_amount.ln_1p()).collect(),
            metrics.iter().map(|m| m.total_output_amount.ln_1p()).collect(),
            metrics.iter().map(|m| m.two_node_loop_count.ln_1p()).collect(),
            metrics.iter().map(|m| m.triangle_loop_count.ln_1p()).collect(),
            metrics
                .iter()
                .map(|m| ((m.unique_in_degree + 1.0) / (m.unique_out_degree + 1.0)).ln())
                .collect(),
            metrics
                .iter()
                .map(|m| ((m.total_input_amount + 1.0) / (m.total_output_amount + 1.0)).ln())
                .collect(),
            metrics.iter().map(|m| m.egonet_density).collect(),
        ];

        let mut zero_variance = Vec::with_capacity(raw.len());
        let mut columns = Vec::with_capacity(raw.len());
        for (name, values) in STANDARDIZED_FEATURES.iter().zip(raw.iter()) {
            match zscore(values) {
                Some(z) => {
                    zero_variance.push(false);
                    columns.push(z);
                }
                None => {
                    tracing::warn!(feature = name, "Zero-variance feature");
                    zero_variance.push(true);
                    columns.push(vec![0.0; values.len()]);
                }
            }
        }

        let matrix = DMatrix::from_fn(metrics.len(), columns.len(), |r, c| columns[c][r]);
        Self { matrix, zero_variance }
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    /// Indices of columns that vary across the population.
    pub fn informative_columns(&self) -> Vec<usize> {
        (0..self.n_features()).filter(|&c| !self.zero_variance[c]).collect()
    }
}

/// `(x - mean) / std` with the sample standard deviation. `None` when the
/// column has fewer than two distinct values.
pub fn zscore(values: &[f64]) -> Option<Vec<f64>> {
    let first = *values.first()?;
    if values.iter().all(|v| *v == first) {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / std).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_uses_sample_std() {
        let z = zscore(&[1.0, 2.0, 3.0]).unwrap();
        assert!((z[0] + 1.0).abs() < 1e-12);
        assert!(z[1].abs() < 1e-12);
        assert!((z[2] - 1.0).abs() < 1e-12);
        assert_eq!(zscore(&[4.0, 4.0, 4.0]), None);
        assert_eq!(zscore(&[]), None);
    }

    #[test]
    fn test_constant_features_are_flagged() {
        let metrics: Vec<AccountMetrics> = (0..4)
            .map(|i| AccountMetrics {
                unique_in_degree: i as f64,
                unique_out_degree: 1.0,
                egonet_density: 0.5,
                ..Default::default()
            })
            .collect();
        let features = StandardizedFeatures::from_metrics(&metrics);
        assert_eq!(features.n_rows(), 4);
        assert_eq!(features.n_features(), STANDARDIZED_FEATURES.len());
        // in-degree and the degree ratio vary; everything else is constant.
        assert_eq!(features.informative_columns(), vec![0, 6]);
        assert!(features.matrix.column(1).iter().all(|v| *v == 0.0));
    }
}
