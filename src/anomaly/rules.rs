use crate::config::RuleConfig;
use crate::features::table::AccountMetrics;

use super::thresholds::ThresholdTable;

/// `value >= threshold`; an absent threshold never fires.
fn at_least(value: f64, threshold: Option<f64>) -> bool {
    threshold.is_some_and(|t| value >= t)
}

/// `|input - output| / input`, undefined when nothing came in.
pub fn retention_ratio(metrics: &AccountMetrics) -> Option<f64> {
    (metrics.total_input_amount > 0.0).then(|| {
        (metrics.total_input_amount - metrics.total_output_amount).abs() / metrics.total_input_amount
    })
}

fn low_retention(metrics: &AccountMetrics, config: &RuleConfig) -> bool {
    retention_ratio(metrics).is_some_and(|r| r <= config.max_retention_ratio)
}

/// H1: top in-degree, few outbound counterparties, forwards nearly everything.
pub fn check_h1(metrics: &AccountMetrics, thresholds: &ThresholdTable, config: &RuleConfig) -> bool {
    at_least(metrics.unique_in_degree, thresholds.unique_in_degree)
        && metrics.unique_out_degree <= config.max_low_out_degree as f64
        && low_retention(metrics, config)
}

/// H2: top in-degree, nothing sent out.
pub fn check_h2(metrics: &AccountMetrics, thresholds: &ThresholdTable) -> bool {
    at_least(metrics.unique_in_degree, thresholds.unique_in_degree) && metrics.unique_out_degree == 0.0
}

/// H3: exactly one inbound counterparty, top out-degree.
pub fn check_h3(metrics: &AccountMetrics, thresholds: &ThresholdTable) -> bool {
    metrics.unique_in_degree == 1.0 && at_least(metrics.unique_out_degree, thresholds.unique_out_degree)
}

/// H4: top in- and out-degree, forwards nearly everything.
pub fn check_h4(metrics: &AccountMetrics, thresholds: &ThresholdTable, config: &RuleConfig) -> bool {
    at_least(metrics.unique_in_degree, thresholds.unique_in_degree)
        && at_least(metrics.unique_out_degree, thresholds.unique_out_degree)
        && low_retention(metrics, config)
}

/// H5: in a two-node loop with top loop amount or loop transfer count.
pub fn check_h5(metrics: &AccountMetrics, thresholds: &ThresholdTable) -> bool {
    metrics.two_node_loop_count >= 1.0
        && (at_least(metrics.two_node_loop_amount, thresholds.two_node_loop_amount)
            || at_least(metrics.two_node_loop_tx_count, thresholds.two_node_loop_tx_count))
}

/// H6: in a triangle with top loop amount or loop transfer count.
pub fn check_h6(metrics: &AccountMetrics, thresholds: &ThresholdTable) -> bool {
    metrics.triangle_loop_count >= 1.0
        && (at_least(metrics.triangle_loop_amount, thresholds.triangle_loop_amount)
            || at_least(metrics.triangle_loop_tx_count, thresholds.triangle_loop_tx_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ThresholdTable {
        ThresholdTable {
            quantile: 0.99,
            unique_in_degree: Some(50.0),
            unique_out_degree: Some(40.0),
            two_node_loop_amount: Some(1_000.0),
            two_node_loop_tx_count: Some(20.0),
            triangle_loop_amount: None,
            triangle_loop_tx_count: Some(9.0),
        }
    }

    fn metrics(in_deg: f64, out_deg: f64, input: f64, output: f64) -> AccountMetrics {
        AccountMetrics {
            unique_in_degree: in_deg,
            unique_out_degree: out_deg,
            total_input_amount: input,
            total_output_amount: output,
            ..Default::default()
        }
    }

    #[test]
    fn test_h1_aggregator_forwarding() {
        let config = RuleConfig::default();
        assert!(check_h1(&metrics(60.0, 2.0, 100.0, 97.0), &thresholds(), &config));
        assert!(!check_h1(&metrics(60.0, 4.0, 100.0, 97.0), &thresholds(), &config));
        assert!(!check_h1(&metrics(60.0, 2.0, 100.0, 50.0), &thresholds(), &config));
    }

    #[test]
    fn test_zero_input_never_fires_retention_rules() {
        let config = RuleConfig::default();
        let m = metrics(60.0, 45.0, 0.0, 0.0);
        assert_eq!(retention_ratio(&m), None);
        assert!(!check_h1(&m, &thresholds(), &config));
        assert!(!check_h4(&m, &thresholds(), &config));
    }

    #[test]
    fn test_h2_h3_h4() {
        let config = RuleConfig::default();
        assert!(check_h2(&metrics(50.0, 0.0, 10.0, 0.0), &thresholds()));
        assert!(!check_h2(&metrics(49.0, 0.0, 10.0, 0.0), &thresholds()));
        assert!(check_h3(&metrics(1.0, 40.0, 10.0, 10.0), &thresholds()));
        assert!(!check_h3(&metrics(2.0, 40.0, 10.0, 10.0), &thresholds()));
        assert!(check_h4(&metrics(55.0, 41.0, 100.0, 104.0), &thresholds(), &config));
    }

    #[test]
    fn test_cycle_rules_need_participation_and_a_threshold() {
        let mut m = AccountMetrics {
            two_node_loop_count: 0.0,
            two_node_loop_amount: 5_000.0,
            ..Default::default()
        };
        assert!(!check_h5(&m, &thresholds()));
        m.two_node_loop_count = 1.0;
        assert!(check_h5(&m, &thresholds()));

        let mut t = AccountMetrics {
            triangle_loop_count: 2.0,
            triangle_loop_amount: 1e12,
            ..Default::default()
        };
        // No amount cutoff: only the tx-count comparison can fire.
        assert!(!check_h6(&t, &thresholds()));
        t.triangle_loop_tx_count = 9.0;
        assert!(check_h6(&t, &thresholds()));
    }
}
