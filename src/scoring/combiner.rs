use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::anomaly::types::{RuleId, RuleOutcome};
use crate::features::table::{FeatureRow, FeatureTable};
use crate::transfer::types::decimal_string;

use super::percentile::{hazen_percentile, top_label, top_percent};

/// One row of the analysis result: the account's features followed by its
/// rule flags and the three component scores. Every score field is null for
/// infra accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAccount {
    pub address: String,
    pub is_infra: bool,
    pub in_degree: Option<u64>,
    pub out_degree: Option<u64>,
    pub unique_in_degree: Option<u64>,
    pub unique_out_degree: Option<u64>,
    #[serde(with = "decimal_string::option")]
    pub total_input_amount: Option<BigDecimal>,
    #[serde(with = "decimal_string::option")]
    pub total_output_amount: Option<BigDecimal>,
    #[serde(with = "decimal_string::option")]
    pub balance_proxy: Option<BigDecimal>,
    pub self_loop_count: Option<u64>,
    pub two_node_loop_count: Option<u64>,
    pub two_node_loop_amount: Option<f64>,
    pub two_node_loop_tx_count: Option<u64>,
    pub triangle_loop_count: Option<u64>,
    pub triangle_loop_amount: Option<f64>,
    pub triangle_loop_tx_count: Option<u64>,
    pub egonet_node_count: Option<u64>,
    pub egonet_edge_count: Option<u64>,
    pub egonet_density: Option<f64>,

    #[serde(rename = "H1_flag")]
    pub h1_flag: Option<u8>,
    #[serde(rename = "H1_description")]
    pub h1_description: String,
    #[serde(rename = "H2_flag")]
    pub h2_flag: Option<u8>,
    #[serde(rename = "H2_description")]
    pub h2_description: String,
    #[serde(rename = "H3_flag")]
    pub h3_flag: Option<u8>,
    #[serde(rename = "H3_description")]
    pub h3_description: String,
    #[serde(rename = "H4_flag")]
    pub h4_flag: Option<u8>,
    #[serde(rename = "H4_description")]
    pub h4_description: String,
    #[serde(rename = "H5_flag")]
    pub h5_flag: Option<u8>,
    #[serde(rename = "H5_description")]
    pub h5_description: String,
    #[serde(rename = "H6_flag")]
    pub h6_flag: Option<u8>,
    #[serde(rename = "H6_description")]
    pub h6_description: String,

    pub rule_score_raw: Option<u8>,
    pub rule_score_100: Option<f64>,
    pub mahalanobis_distance: Option<f64>,
    pub statistical_score_100: Option<f64>,
    pub iforest_score: Option<f64>,
    pub isolation_score_100: Option<f64>,
    pub final_score_0_100: Option<f64>,
    pub final_score_top_percent: Option<f64>,
    pub final_rank: Option<String>,
}

/// Component scores of one non-infra account.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AccountScores {
    rules: RuleOutcome,
    mahalanobis_distance: f64,
    statistical_score: f64,
    iforest_score: f64,
    isolation_score: f64,
    final_score: f64,
    top_percent: f64,
}

impl ScoredAccount {
    fn new(row: &FeatureRow, scores: Option<AccountScores>) -> Self {
        let flag = |rule: RuleId| scores.map(|s| s.rules.fired(rule) as u8);
        let description = |rule: RuleId| {
            scores
                .map(|s| s.rules.description(rule).to_string())
                .unwrap_or_default()
        };

        Self {
            address: row.address.clone(),
            is_infra: row.is_infra,
            in_degree: row.in_degree,
            out_degree: row.out_degree,
            unique_in_degree: row.unique_in_degree,
            unique_out_degree: row.unique_out_degree,
            total_input_amount: row.total_input_amount.clone(),
            total_output_amount: row.total_output_amount.clone(),
            balance_proxy: row.balance_proxy.clone(),
            self_loop_count: row.self_loop_count,
            two_node_loop_count: row.two_node_loop_count,
            two_node_loop_amount: row.two_node_loop_amount,
            two_node_loop_tx_count: row.two_node_loop_tx_count,
            triangle_loop_count: row.triangle_loop_count,
            triangle_loop_amount: row.triangle_loop_amount,
            triangle_loop_tx_count: row.triangle_loop_tx_count,
            egonet_node_count: row.egonet_node_count,
            egonet_edge_count: row.egonet_edge_count,
            egonet_density: row.egonet_density,
            h1_flag: flag(RuleId::H1),
            h1_description: description(RuleId::H1),
            h2_flag: flag(RuleId::H2),
            h2_description: description(RuleId::H2),
            h3_flag: flag(RuleId::H3),
            h3_description: description(RuleId::H3),
            h4_flag: flag(RuleId::H4),
            h4_description: description(RuleId::H4),
            h5_flag: flag(RuleId::H5),
            h5_description: description(RuleId::H5),
            h6_flag: flag(RuleId::H6),
            h6_description: description(RuleId::H6),
            rule_score_raw: scores.map(|s| s.rules.raw_score()),
            rule_score_100: scores.map(|s| s.rules.scaled_score()),
            mahalanobis_distance: scores.map(|s| s.mahalanobis_distance),
            statistical_score_100: scores.map(|s| s.statistical_score),
            iforest_score: scores.map(|s| s.iforest_score),
            isolation_score_100: scores.map(|s| s.isolation_score),
            final_score_0_100: scores.map(|s| s.final_score),
            final_score_top_percent: scores.map(|s| s.top_percent),
            final_rank: scores.map(|s| top_label(s.top_percent)),
        }
    }
}

/// Merge rule outcomes and detector outputs back onto the full table.
///
/// `outcomes` is aligned with `table.rows`; `distances` and `iforest` are
/// aligned with the table's non-infra rows, in table order.
pub fn combine_scores(
    table: &FeatureTable,
    outcomes: &[Option<RuleOutcome>],
    distances: &[f64],
    iforest: &[f64],
) -> eyre::Result<Vec<ScoredAccount>> {
    let scored = table.scored_indices();
    if outcomes.len() != table.len() || distances.len() != scored.len() || iforest.len() != scored.len() {
        return Err(eyre::eyre!(
            "Score alignment mismatch: {} rows ({} scored), {} rule outcomes, {} distances, {} isolation scores",
            table.len(),
            scored.len(),
            outcomes.len(),
            distances.len(),
            iforest.len()
        ));
    }

    let statistical = hazen_percentile(distances);
    let isolation = hazen_percentile(iforest);

    let mut rule_outcomes = Vec::with_capacity(scored.len());
    for &i in &scored {
        let outcome = outcomes[i].ok_or_else(|| {
            eyre::eyre!("Missing rule outcome for non-infra account '{}'", table.rows[i].address)
        })?;
        rule_outcomes.push(outcome);
    }

    let finals: Vec<f64> = rule_outcomes
        .iter()
        .zip(statistical.iter().zip(&isolation))
        .map(|(rules, (s, i))| (rules.scaled_score() + s + i) / 3.0)
        .collect();
    let top = top_percent(&finals);

    let mut per_row: Vec<Option<AccountScores>> = vec![None; table.len()];
    for (k, &i) in scored.iter().enumerate() {
        per_row[i] = Some(AccountScores {
            rules: rule_outcomes[k],
            mahalanobis_distance: distances[k],
            statistical_score: statistical[k],
            iforest_score: iforest[k],
            isolation_score: isolation[k],
            final_score: finals[k],
            top_percent: top[k],
        });
    }

    let accounts: Vec<ScoredAccount> = table
        .rows
        .iter()
        .zip(per_row)
        .map(|(row, scores)| ScoredAccount::new(row, scores))
        .collect();

    tracing::info!(
        accounts = accounts.len(),
        scored = scored.len(),
        "Combined anomaly scores"
    );
    Ok(accounts)
}

/// The `n` highest final scores among non-infra accounts, best first. Ties
/// are broken by address so the order is stable.
pub fn top_accounts(accounts: &[ScoredAccount], n: usize) -> Vec<&ScoredAccount> {
    let mut scored: Vec<&ScoredAccount> = accounts
        .iter()
        .filter(|a| a.final_score_0_100.is_some())
        .collect();
    scored.sort_by(|a, b| {
        let (x, y) = (a.final_score_0_100.unwrap_or(0.0), b.final_score_0_100.unwrap_or(0.0));
        y.partial_cmp(&x)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    scored.truncate(n);
    scored
}

pub fn write_results_csv<W: std::io::Write>(accounts: &[ScoredAccount], writer: W) -> eyre::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for account in accounts {
        writer.serialize(account)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: &str, is_infra: bool) -> FeatureRow {
        let mut row = FeatureRow::infra(address.to_string());
        row.is_infra = is_infra;
        row
    }

    fn fired(rules: &[RuleId]) -> Option<RuleOutcome> {
        let mut outcome = RuleOutcome::default();
        for r in rules {
            outcome.set(*r, true);
        }
        Some(outcome)
    }

    #[test]
    fn test_combine_keeps_order_and_nulls_infra() {
        let table = FeatureTable {
            rows: vec![row("a", false), row("hub", true), row("b", false), row("c", false)],
        };
        let outcomes = vec![fired(&[]), None, fired(&[RuleId::H2, RuleId::H5]), fired(&[])];
        let distances = [0.5, 3.0, 1.0];
        let iforest = [0.40, 0.70, 0.45];

        let accounts = combine_scores(&table, &outcomes, &distances, &iforest).unwrap();
        let addresses: Vec<&str> = accounts.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "hub", "b", "c"]);

        let hub = &accounts[1];
        assert!(hub.final_score_0_100.is_none());
        assert!(hub.h1_flag.is_none());
        assert!(hub.final_rank.is_none());
        assert_eq!(hub.h1_description, "");

        let b = &accounts[2];
        assert_eq!(b.rule_score_raw, Some(2));
        assert_eq!(b.rule_score_100, Some(66.67));
        assert_eq!(b.h2_flag, Some(1));
        assert_eq!(b.h1_flag, Some(0));
        // Highest distance and isolation score of three: Hazen 83.33 each.
        let expected = (66.67 + 2.5 / 3.0 * 100.0 * 2.0) / 3.0;
        assert!((b.final_score_0_100.unwrap() - expected).abs() < 1e-9);
        assert_eq!(b.final_rank.as_deref(), Some("Top 33.33%"));

        let top = top_accounts(&accounts, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].address, "b");
    }

    #[test]
    fn test_combine_rejects_misaligned_inputs() {
        let table = FeatureTable {
            rows: vec![row("a", false)],
        };
        assert!(combine_scores(&table, &[fired(&[])], &[], &[0.5]).is_err());
    }

    #[test]
    fn test_results_csv_has_flag_columns() {
        let table = FeatureTable {
            rows: vec![row("a", false), row("hub", true)],
        };
        let accounts = combine_scores(&table, &[fired(&[RuleId::H3]), None], &[0.0], &[0.5]).unwrap();
        let mut out = Vec::new();
        write_results_csv(&accounts, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("H3_flag,H3_description"));
        assert!(header.ends_with("final_score_top_percent,final_rank"));
        assert!(text.contains("Top 100.00%"));
    }
}
