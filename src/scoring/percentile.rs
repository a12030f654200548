/// 1-based ascending ranks; tied values share their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Hazen percentile `(rank - 0.5) / N * 100`: larger input, larger percentile.
pub fn hazen_percentile(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    average_ranks(values)
        .into_iter()
        .map(|rank| (rank - 0.5) / n * 100.0)
        .collect()
}

/// Descending rank as a percentage of the population, rounded to two decimals:
/// the best score gets the smallest value.
pub fn top_percent(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    average_ranks(values)
        .into_iter()
        .map(|rank| {
            let descending = (n + 1) as f64 - rank;
            (descending / n as f64 * 100.0 * 100.0).round() / 100.0
        })
        .collect()
}

pub fn top_label(percent: f64) -> String {
    format!("Top {:.2}%", percent)
}
