use bigdecimal::{BigDecimal, Signed, Zero};
use std::collections::HashMap;

use crate::error::ScoringError;
use crate::transfer::types::TransferRecord;

use super::types::{AggregatedEdge, NodeId, TransferGraph};

/// Fold a transfer stream into a directed graph with one edge per ordered
/// address pair: summed amount, transfer count, earliest timestamp and the
/// first-seen token.
///
/// Vertex ids follow first appearance in the stream (sender before receiver).
/// Self-transfers become self-loop edges. An empty stream yields an empty graph.
pub fn build_graph(transfers: &[TransferRecord]) -> Result<TransferGraph, ScoringError> {
    let mut addresses: Vec<String> = Vec::new();
    let mut address_to_id: HashMap<&str, NodeId> = HashMap::new();

    // Pre-aggregate: group transfers by (source, target)
    let mut edge_map: HashMap<(NodeId, NodeId), AggregatedEdge> = HashMap::new();
    for t in transfers {
        if t.amount.is_negative() || !t.amount.is_integer() {
            return Err(ScoringError::InvalidAmount {
                transfer_id: t.transfer_id.clone(),
                value: t.amount.to_string(),
            });
        }

        let source = intern(&mut addresses, &mut address_to_id, &t.from_address);
        let target = intern(&mut addresses, &mut address_to_id, &t.to_address);

        let entry = edge_map
            .entry((source, target))
            .or_insert_with(|| AggregatedEdge {
                source,
                target,
                amount: BigDecimal::zero(),
                transfer_count: 0,
                first_seen: t.timestamp,
                token_id: t.token_id.clone(),
            });
        entry.transfer_count += 1;
        entry.amount += &t.amount;
        if t.timestamp < entry.first_seen {
            entry.first_seen = t.timestamp;
        }
    }

    let edges: Vec<AggregatedEdge> = edge_map.into_values().collect();
    tracing::info!(
        transfers = transfers.len(),
        edges = edges.len(),
        nodes = addresses.len(),
        "Aggregated transfers into graph"
    );

    Ok(TransferGraph::from_parts(addresses, edges))
}

fn intern<'a>(
    addresses: &mut Vec<String>,
    address_to_id: &mut HashMap<&'a str, NodeId>,
    address: &'a str,
) -> NodeId {
    *address_to_id.entry(address).or_insert_with(|| {
        let id = addresses.len() as NodeId;
        addresses.push(address.to_string());
        id
    })
}
