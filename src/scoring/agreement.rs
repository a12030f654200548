//! How much the three detectors agree on who is anomalous.

use serde::Serialize;
use std::collections::HashSet;

use crate::anomaly::thresholds::quantile_linear;

use super::combiner::ScoredAccount;
use super::percentile::average_ranks;

/// Top fractions the overlap tables are computed at: 0.1%, 0.5% and 1%.
pub const TOP_FRACTIONS: [f64; 3] = [0.001, 0.005, 0.01];

/// Fraction used to binarize scores for Cohen's kappa.
pub const KAPPA_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairOverlap {
    pub q_percent: f64,
    pub k: usize,
    pub pair: String,
    pub intersection: usize,
    pub union: usize,
    pub jaccard: f64,
    pub overlap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripleIntersection {
    pub q_percent: f64,
    pub k: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairCorrelation {
    pub pair: String,
    /// `None` when either score is constant over the population.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementReport {
    pub samples: usize,
    pub overlaps: Vec<PairOverlap>,
    pub triples: Vec<TripleIntersection>,
    pub spearman: Vec<PairCorrelation>,
    pub cohen_kappa: Vec<PairCorrelation>,
}

/// Compare the rule, Mahalanobis and isolation scores of the scored accounts.
pub fn agreement_report(accounts: &[ScoredAccount]) -> AgreementReport {
    let scored: Vec<&ScoredAccount> = accounts.iter().filter(|a| !a.is_infra).collect();
    let detectors: [(&str, Vec<f64>); 3] = [
        ("Rule", scored.iter().map(|a| a.rule_score_100.unwrap_or(0.0)).collect()),
        ("Mahalanobis", scored.iter().map(|a| a.statistical_score_100.unwrap_or(0.0)).collect()),
        ("IForest", scored.iter().map(|a| a.isolation_score_100.unwrap_or(0.0)).collect()),
    ];
    let pairs = [(0, 1), (0, 2), (1, 2)];
    let pair_name = |a: usize, b: usize| format!("{} vs {}", detectors[a].0, detectors[b].0);
    let n = scored.len();

    let mut overlaps = Vec::new();
    let mut triples = Vec::new();
    for q in TOP_FRACTIONS {
        let k = ((n as f64 * q).round() as usize).max(1);
        let tops: Vec<HashSet<usize>> = detectors.iter().map(|(_, s)| top_k(s, k)).collect();
        for &(a, b) in &pairs {
            let intersection = tops[a].intersection(&tops[b]).count();
            let union = tops[a].union(&tops[b]).count();
            overlaps.push(PairOverlap {
                q_percent: q * 100.0,
                k,
                pair: pair_name(a, b),
                intersection,
                union,
                jaccard: if union > 0 { intersection as f64 / union as f64 } else { 0.0 },
                overlap: intersection as f64 / k as f64,
            });
        }
        let size = tops[0]
            .iter()
            .filter(|i| tops[1].contains(i) && tops[2].contains(i))
            .count();
        triples.push(TripleIntersection {
            q_percent: q * 100.0,
            k,
            size,
        });
    }

    let spearman = pairs
        .iter()
        .map(|&(a, b)| PairCorrelation {
            pair: pair_name(a, b),
            value: spearman_rho(&detectors[a].1, &detectors[b].1),
        })
        .collect();
    let cohen_kappa = pairs
        .iter()
        .map(|&(a, b)| PairCorrelation {
            pair: pair_name(a, b),
            value: cohen_kappa(
                &top_fraction_labels(&detectors[a].1, KAPPA_FRACTION),
                &top_fraction_labels(&detectors[b].1, KAPPA_FRACTION),
            ),
        })
        .collect();

    let report = AgreementReport {
        samples: n,
        overlaps,
        triples,
        spearman,
        cohen_kappa,
    };
    for t in &report.triples {
        tracing::info!(q_percent = t.q_percent, k = t.k, triple = t.size, "Detector agreement");
    }
    report
}

/// Indices of the `k` largest scores; ties go to the earlier row.
fn top_k(scores: &[f64], k: usize) -> HashSet<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.into_iter().take(k).collect()
}

/// 1 for scores at or above the `1 - fraction` quantile.
fn top_fraction_labels(scores: &[f64], fraction: f64) -> Vec<bool> {
    match quantile_linear(scores.to_vec(), 1.0 - fraction) {
        Some(threshold) => scores.iter().map(|s| *s >= threshold).collect(),
        None => Vec::new(),
    }
}

/// Spearman's rho: Pearson correlation of the average ranks.
pub fn spearman_rho(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    pearson(&average_ranks(x), &average_ranks(y))
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx * vy).sqrt())
}

/// Cohen's kappa of two binary labelings. `None` when chance agreement is total.
pub fn cohen_kappa(a: &[bool], b: &[bool]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let observed = a.iter().zip(b).filter(|(x, y)| x == y).count() as f64 / n;
    let pa = a.iter().filter(|x| **x).count() as f64 / n;
    let pb = b.iter().filter(|x| **x).count() as f64 / n;
    let expected = pa * pb + (1.0 - pa) * (1.0 - pb);
    if expected >= 1.0 {
        return None;
    }
    Some((observed - expected) / (1.0 - expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spearman() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((spearman_rho(&x, &[10.0, 20.0, 30.0, 40.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((spearman_rho(&x, &[4.0, 3.0, 2.0, 1.0]).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(spearman_rho(&x, &[5.0, 5.0, 5.0, 5.0]), None);
    }

    #[test]
    fn test_cohen_kappa() {
        let a = [true, false, false, false];
        assert!((cohen_kappa(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(cohen_kappa(&[false, false], &[false, false]), None);
    }

    #[test]
    fn test_top_k_prefers_earlier_rows_on_ties() {
        let top = top_k(&[5.0, 9.0, 9.0, 1.0], 2);
        assert_eq!(top, HashSet::from([1, 2]));
        let top = top_k(&[0.0, 0.0, 0.0], 1);
        assert_eq!(top, HashSet::from([0]));
    }

    #[test]
    fn test_report_shape() {
        use crate::anomaly::types::RuleOutcome;
        use crate::features::table::{FeatureRow, FeatureTable};
        use crate::scoring::combiner::combine_scores;

        let rows: Vec<FeatureRow> = (0..10)
            .map(|i| {
                let mut row = FeatureRow::infra(format!("a{}", i));
                row.is_infra = false;
                row
            })
            .collect();
        let table = FeatureTable { rows };
        let outcomes = vec![Some(RuleOutcome::default()); 10];
        let distances: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let iforest: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();
        let accounts = combine_scores(&table, &outcomes, &distances, &iforest).unwrap();

        let report = agreement_report(&accounts);
        assert_eq!(report.samples, 10);
        assert_eq!(report.overlaps.len(), 9);
        assert_eq!(report.triples.len(), 3);
        // Mahalanobis and isolation rank identically; rule scores are constant.
        let mi = &report.spearman[2];
        assert_eq!(mi.pair, "Mahalanobis vs IForest");
        assert!((mi.value.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(report.spearman[0].value, None);
        assert!(report.overlaps.iter().all(|o| o.k == 1));
    }
}
