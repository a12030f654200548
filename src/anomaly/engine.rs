use crate::config::RuleConfig;
use crate::features::table::{FeatureRow, FeatureTable};

use super::rules;
use super::thresholds::ThresholdTable;
use super::types::{RuleId, RuleOutcome};

/// Evaluates H1..H6 against a fixed threshold table. Holds no mutable state,
/// so the same engine gives the same flags for the same row every time.
pub struct RuleEngine {
    thresholds: ThresholdTable,
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(thresholds: ThresholdTable, config: RuleConfig) -> Self {
        Self { thresholds, config }
    }

    /// Evaluate one row. Infra rows are not scored.
    pub fn evaluate(&self, row: &FeatureRow) -> Option<RuleOutcome> {
        if row.is_infra {
            return None;
        }
        let m = row.metrics();
        let t = &self.thresholds;

        let mut outcome = RuleOutcome::default();
        outcome.set(RuleId::H1, rules::check_h1(&m, t, &self.config));
        outcome.set(RuleId::H2, rules::check_h2(&m, t));
        outcome.set(RuleId::H3, rules::check_h3(&m, t));
        outcome.set(RuleId::H4, rules::check_h4(&m, t, &self.config));
        outcome.set(RuleId::H5, rules::check_h5(&m, t));
        outcome.set(RuleId::H6, rules::check_h6(&m, t));

        if outcome.raw_score() > 0 {
            tracing::debug!(
                address = %row.address,
                rules = ?outcome.fired_rules().map(|r| r.as_str()).collect::<Vec<_>>(),
                "Rules fired"
            );
        }
        Some(outcome)
    }

    /// Evaluate every row of the table, in table order.
    pub fn evaluate_table(&self, table: &FeatureTable) -> Vec<Option<RuleOutcome>> {
        let outcomes: Vec<Option<RuleOutcome>> = table.rows.iter().map(|r| self.evaluate(r)).collect();

        let mut per_rule = [0usize; 6];
        for outcome in outcomes.iter().flatten() {
            for rule in outcome.fired_rules() {
                per_rule[rule as usize] += 1;
            }
        }
        let flagged = outcomes.iter().flatten().filter(|o| o.raw_score() > 0).count();
        tracing::info!(
            flagged,
            h1 = per_rule[0],
            h2 = per_rule[1],
            h3 = per_rule[2],
            h4 = per_rule[3],
            h5 = per_rule[4],
            h6 = per_rule[5],
            "Applied rule engine"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_row(address: &str, in_deg: u64, out_deg: u64, input: u64, output: u64) -> FeatureRow {
        let mut row = FeatureRow::infra(address.to_string());
        row.is_infra = false;
        row.unique_in_degree = Some(in_deg);
        row.unique_out_degree = Some(out_deg);
        row.total_input_amount = Some(input.into());
        row.total_output_amount = Some(output.into());
        row.two_node_loop_count = Some(0);
        row.triangle_loop_count = Some(0);
        row
    }

    #[test]
    fn test_engine_is_deterministic_and_skips_infra() {
        let table = FeatureTable {
            rows: vec![
                scored_row("a", 2, 1, 10, 10),
                scored_row("b", 2, 1, 10, 10),
                scored_row("sink", 30, 0, 500, 0),
                FeatureRow::infra("hub".to_string()),
                scored_row("fan", 1, 40, 400, 400),
            ],
        };
        let thresholds = ThresholdTable::compute(&table, 0.99);
        let engine = RuleEngine::new(thresholds, RuleConfig::default());

        let first = engine.evaluate_table(&table);
        let second = engine.evaluate_table(&table);
        assert_eq!(first, second);

        assert!(first[3].is_none());
        let sink = first[2].unwrap();
        assert!(sink.fired(RuleId::H2));
        assert_eq!(sink.raw_score(), 1);
        assert!(first[4].unwrap().fired(RuleId::H3));
        // Thresholds sit near the extremes, so ordinary rows stay clean.
        assert_eq!(first[0].unwrap().raw_score(), 0);
        assert_eq!(first[1].unwrap().raw_score(), 0);
    }
}
