use bigdecimal::{BigDecimal, Zero};
use rayon::prelude::*;

use crate::graph::types::{ExcludedNodes, NodeId, TransferGraph};

/// Degree and flow features of one account.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeFeatures {
    /// Inbound transfers (sum of aggregated edge counts).
    pub in_degree: u64,
    /// Outbound transfers (sum of aggregated edge counts).
    pub out_degree: u64,
    /// Distinct inbound counterparties.
    pub unique_in_degree: u64,
    /// Distinct outbound counterparties.
    pub unique_out_degree: u64,
    pub total_input_amount: BigDecimal,
    pub total_output_amount: BigDecimal,
    /// `total_input_amount - total_output_amount`.
    pub balance_proxy: BigDecimal,
}

/// Compute degree features for every vertex, in vertex order.
///
/// Excluded vertices get `None`. Edges to excluded counterparties still
/// count: exclusion only removes a vertex as a computation center here.
pub fn extract_degree_features(
    graph: &TransferGraph,
    excluded: &ExcludedNodes,
) -> Vec<Option<DegreeFeatures>> {
    (0..graph.node_count() as NodeId)
        .into_par_iter()
        .map(|v| {
            if excluded.is_excluded(v) {
                return None;
            }
            Some(node_degree(graph, v))
        })
        .collect()
}

fn node_degree(graph: &TransferGraph, v: NodeId) -> DegreeFeatures {
    let mut in_degree = 0u64;
    let mut total_input_amount = BigDecimal::zero();
    for &id in graph.in_edge_ids(v) {
        let e = graph.edge(id);
        in_degree += e.transfer_count;
        total_input_amount += &e.amount;
    }

    let mut out_degree = 0u64;
    let mut total_output_amount = BigDecimal::zero();
    for id in graph.out_edge_ids(v) {
        let e = graph.edge(id);
        out_degree += e.transfer_count;
        total_output_amount += &e.amount;
    }

    let balance_proxy = &total_input_amount - &total_output_amount;
    DegreeFeatures {
        in_degree,
        out_degree,
        unique_in_degree: graph.in_neighbors(v).len() as u64,
        unique_out_degree: graph.out_neighbors(v).len() as u64,
        total_input_amount,
        total_output_amount,
        balance_proxy,
    }
}
