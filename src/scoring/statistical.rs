use nalgebra::{DMatrix, DVector};

use super::standardize::StandardizedFeatures;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-9;

/// Mahalanobis distance of every row to the population centroid, over the
/// columns that vary. All rows get 0 when no column varies.
pub fn mahalanobis_distances(features: &StandardizedFeatures) -> eyre::Result<Vec<f64>> {
    let n = features.n_rows();
    let columns = features.informative_columns();
    let dropped = features.n_features() - columns.len();
    if dropped > 0 {
        tracing::info!(dropped, kept = columns.len(), "Dropping zero-variance features for Mahalanobis");
    }
    if columns.is_empty() || n < 2 {
        return Ok(vec![0.0; n]);
    }

    let data = DMatrix::from_fn(n, columns.len(), |r, c| features.matrix[(r, columns[c])]);
    let mean = DVector::from_fn(columns.len(), |c, _| data.column(c).mean());
    let mut centered = data;
    for mut row in centered.row_iter_mut() {
        row -= mean.transpose();
    }
    let covariance = centered.transpose() * &centered / (n as f64 - 1.0);

    let (inverse, rank) = inverse_covariance(covariance)?;
    if rank < columns.len() {
        tracing::warn!(
            features = columns.len(),
            rank,
            "Rank-deficient covariance matrix, using pseudo-inverse"
        );
    }

    let distances: Vec<f64> = centered
        .row_iter()
        .map(|row| {
            let x = row.transpose();
            let squared = x.dot(&(&inverse * &x));
            squared.max(0.0).sqrt()
        })
        .collect();

    tracing::info!(
        rows = n,
        features = columns.len(),
        max = distances.iter().cloned().fold(0.0, f64::max),
        "Computed Mahalanobis distances"
    );
    Ok(distances)
}

/// Pseudo-inverse of a covariance matrix and its numerical rank.
///
/// Rank comes from the singular values relative to the largest one. The
/// log-ratio features are differences of the log features, so the matrix
/// is singular whenever both ratio columns vary.
fn inverse_covariance(covariance: DMatrix<f64>) -> eyre::Result<(DMatrix<f64>, usize)> {
    let svd = covariance.svd(true, true);
    let largest = svd.singular_values.max();
    let tolerance = largest * RANK_TOLERANCE;
    let rank = svd.singular_values.iter().filter(|s| **s > tolerance).count();
    let inverse = svd
        .pseudo_inverse(tolerance)
        .map_err(|e| eyre::eyre!("Failed to invert covariance matrix: {}", e))?;
    Ok((inverse, rank))
}
