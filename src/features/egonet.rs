use rayon::prelude::*;

use crate::graph::types::{ExcludedNodes, NodeId, TransferGraph};

/// Shape of an account's 1-hop neighborhood.
#[derive(Debug, Clone, PartialEq)]
pub struct EgonetFeatures {
    /// `n`: the account plus its non-excluded neighbors in either direction.
    pub egonet_node_count: u64,
    /// `m`: directed edges between ego members, self-loops not counted.
    pub egonet_edge_count: u64,
    /// `m / (n * (n - 1))`, 0 when `n <= 1`.
    pub egonet_density: f64,
}

/// Compute egonet features for every vertex, in vertex order. Excluded
/// vertices get `None` and are dropped from every other vertex's ego set.
pub fn extract_egonet_features(
    graph: &TransferGraph,
    excluded: &ExcludedNodes,
) -> Vec<Option<EgonetFeatures>> {
    let features: Vec<Option<EgonetFeatures>> = (0..graph.node_count() as NodeId)
        .into_par_iter()
        .map(|v| {
            if excluded.is_excluded(v) {
                return None;
            }
            Some(node_egonet(graph, excluded, v))
        })
        .collect();

    tracing::info!(nodes = features.len(), "Extracted egonet features");
    features
}

fn node_egonet(graph: &TransferGraph, excluded: &ExcludedNodes, v: NodeId) -> EgonetFeatures {
    let mut ego: Vec<NodeId> = graph
        .out_neighbors(v)
        .iter()
        .chain(graph.in_neighbors(v))
        .copied()
        .filter(|&u| !excluded.is_excluded(u))
        .collect();
    ego.push(v);
    ego.sort_unstable();
    ego.dedup();

    let n = ego.len() as u64;
    let mut m = 0u64;
    for &u in &ego {
        m += graph
            .out_neighbors(u)
            .iter()
            .filter(|&&x| x != u && ego.binary_search(&x).is_ok())
            .count() as u64;
    }

    let max_edges = n * n.saturating_sub(1);
    let egonet_density = if max_edges > 0 {
        m as f64 / max_edges as f64
    } else {
        0.0
    };

    EgonetFeatures {
        egonet_node_count: n,
        egonet_edge_count: m,
        egonet_density,
    }
}
