use std::collections::HashSet;

use bigdecimal::BigDecimal;

use crate::config::FilterConfig;

use super::types::{bare_address, TransferRecord};

/// Drop micro transfers and transfers touching burn/null placeholder addresses.
pub fn filter_transfers(transfers: Vec<TransferRecord>, config: &FilterConfig) -> Vec<TransferRecord> {
    let before = transfers.len();
    let min_amount = BigDecimal::from(config.min_amount);
    let blacklist: HashSet<String> = config.blacklist.iter().map(|a| bare_address(a)).collect();

    let kept: Vec<TransferRecord> = transfers
        .into_iter()
        .filter(|t| t.amount >= min_amount)
        .filter(|t| {
            !blacklist.contains(&bare_address(&t.from_address))
                && !blacklist.contains(&bare_address(&t.to_address))
        })
        .collect();

    tracing::info!(
        before,
        after = kept.len(),
        min_amount = config.min_amount,
        "Filtered transfer stream"
    );
    kept
}
