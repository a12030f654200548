//! Loop motifs: self-loops, reciprocal pairs and directed triangles.
//!
//! Every computation sees the graph through the exclusion mask: an excluded
//! vertex is never a center and never appears as anyone's neighbor, so its
//! edges contribute nothing to other vertices' motifs.

use rayon::prelude::*;

use crate::graph::types::{ExcludedNodes, NodeId, TransferGraph};

/// Loop participation of one account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotifFeatures {
    /// 1 if the account sent funds to itself.
    pub self_loop_count: u64,
    /// Counterparties with edges in both directions.
    pub two_node_loop_count: u64,
    /// Amount over both directions of every reciprocal pair.
    pub two_node_loop_amount: f64,
    pub two_node_loop_tx_count: u64,
    /// Directed 3-cycles the account participates in.
    pub triangle_loop_count: u64,
    /// Amount over the three edges of every triangle, credited to each participant.
    pub triangle_loop_amount: f64,
    pub triangle_loop_tx_count: u64,
}

/// Recoverable events from a motif pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotifDiagnostics {
    /// Vertices left out of triangle enumeration for exceeding the out-degree cap.
    pub capped_nodes: Vec<NodeId>,
    /// Distinct directed triangles found.
    pub triangles: u64,
}

#[derive(Debug, Clone)]
pub struct MotifExtraction {
    pub features: Vec<Option<MotifFeatures>>,
    pub diagnostics: MotifDiagnostics,
}

/// A directed 3-cycle `nodes[0] -> nodes[1] -> nodes[2] -> nodes[0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Triangle {
    nodes: [NodeId; 3],
    amount: f64,
    tx_count: u64,
}

/// Compute motif features for every vertex, in vertex order.
///
/// `max_triangle_out_degree` bounds triangle enumeration: a vertex whose
/// filtered out-degree exceeds it is recorded in the diagnostics and every
/// triangle through it is skipped. `None` enumerates everything.
pub fn extract_motif_features(
    graph: &TransferGraph,
    excluded: &ExcludedNodes,
    max_triangle_out_degree: Option<usize>,
) -> MotifExtraction {
    let n = graph.node_count();

    let capped: Vec<bool> = (0..n as NodeId)
        .into_par_iter()
        .map(|v| {
            !excluded.is_excluded(v)
                && max_triangle_out_degree.is_some_and(|cap| filtered_out_degree(graph, excluded, v) > cap)
        })
        .collect();
    let capped_nodes: Vec<NodeId> = (0..n as NodeId).filter(|&v| capped[v as usize]).collect();
    if !capped_nodes.is_empty() {
        tracing::warn!(
            capped = capped_nodes.len(),
            cap = ?max_triangle_out_degree,
            "Skipping triangle enumeration through high out-degree nodes"
        );
    }

    // Enumerate in parallel, credit sequentially so float sums are reproducible.
    let per_start: Vec<Vec<Triangle>> = (0..n as NodeId)
        .into_par_iter()
        .map(|u| {
            if excluded.is_excluded(u) || capped[u as usize] {
                return Vec::new();
            }
            triangles_from(graph, excluded, &capped, u)
        })
        .collect();

    let mut triangle_count = vec![0u64; n];
    let mut triangle_amount = vec![0f64; n];
    let mut triangle_tx = vec![0u64; n];
    let mut triangles = 0u64;
    for triangle in per_start.iter().flatten() {
        triangles += 1;
        for &node in &triangle.nodes {
            triangle_count[node as usize] += 1;
            triangle_amount[node as usize] += triangle.amount;
            triangle_tx[node as usize] += triangle.tx_count;
        }
    }

    let features = (0..n as NodeId)
        .into_par_iter()
        .map(|v| {
            if excluded.is_excluded(v) {
                return None;
            }
            let mut features = two_node_loops(graph, excluded, v);
            features.self_loop_count = u64::from(graph.has_edge(v, v));
            features.triangle_loop_count = triangle_count[v as usize];
            features.triangle_loop_amount = triangle_amount[v as usize];
            features.triangle_loop_tx_count = triangle_tx[v as usize];
            Some(features)
        })
        .collect();

    tracing::info!(
        nodes = n,
        excluded = excluded.count(),
        triangles,
        "Extracted motif features"
    );

    MotifExtraction {
        features,
        diagnostics: MotifDiagnostics {
            capped_nodes,
            triangles,
        },
    }
}

fn filtered_out_degree(graph: &TransferGraph, excluded: &ExcludedNodes, v: NodeId) -> usize {
    graph
        .out_neighbors(v)
        .iter()
        .filter(|&&w| !excluded.is_excluded(w))
        .count()
}

/// Reciprocal pairs seen from `v`. Each pair is found independently from
/// both endpoints, so both are credited with the full pair totals.
fn two_node_loops(graph: &TransferGraph, excluded: &ExcludedNodes, v: NodeId) -> MotifFeatures {
    let mut features = MotifFeatures::default();
    for out_id in graph.out_edge_ids(v) {
        let u = graph.edge(out_id).target;
        if u == v || excluded.is_excluded(u) {
            continue;
        }
        if let Some(back_id) = graph.find_edge(u, v) {
            features.two_node_loop_count += 1;
            features.two_node_loop_amount += graph.edge_amount(out_id) + graph.edge_amount(back_id);
            features.two_node_loop_tx_count +=
                graph.edge(out_id).transfer_count + graph.edge(back_id).transfer_count;
        }
    }
    features
}

/// Every directed triangle whose smallest vertex is `u`, traversed from `u`.
///
/// Fixing the smallest id as the start removes the three rotations of a
/// cycle. A vertex triple with cycles in both directions is one triangle,
/// taken in the orientation whose second vertex has the smaller id.
fn triangles_from(
    graph: &TransferGraph,
    excluded: &ExcludedNodes,
    capped: &[bool],
    u: NodeId,
) -> Vec<Triangle> {
    let skip = |x: NodeId| excluded.is_excluded(x) || capped[x as usize];
    let mut found = Vec::new();

    let out_u = graph.out_edge_ids(u);
    let first_above_u = out_u.start + graph.out_neighbors(u).partition_point(|&w| w <= u);
    for uw in first_above_u..out_u.end {
        let w = graph.edge(uw).target;
        if skip(w) {
            continue;
        }
        let out_w = graph.out_edge_ids(w);
        let first_above_w = out_w.start + graph.out_neighbors(w).partition_point(|&v| v <= u);
        for wv in first_above_w..out_w.end {
            let v = graph.edge(wv).target;
            if v == w || skip(v) {
                continue;
            }
            if let Some(vu) = graph.find_edge(v, u) {
                if v < w && reversed_cycle(graph, u, w, v) {
                    continue;
                }
                found.push(Triangle {
                    nodes: [u, w, v],
                    amount: graph.edge_amount(uw) + graph.edge_amount(wv) + graph.edge_amount(vu),
                    tx_count: graph.edge(uw).transfer_count
                        + graph.edge(wv).transfer_count
                        + graph.edge(vu).transfer_count,
                });
            }
        }
    }
    found
}

/// Whether `u -> v -> w -> u` also exists for the cycle `u -> w -> v -> u`.
fn reversed_cycle(graph: &TransferGraph, u: NodeId, w: NodeId, v: NodeId) -> bool {
    graph.has_edge(u, v) && graph.has_edge(v, w) && graph.has_edge(w, u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::build_graph;
    use crate::transfer::types::TransferRecord;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};

    fn transfer(from: &str, to: &str, amount: u64) -> TransferRecord {
        TransferRecord {
            chain_id: 1,
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: BigDecimal::from(amount),
            transfer_id: String::new(),
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            token_id: "eth".to_string(),
        }
    }

    fn graph_of(edges: &[(&str, &str, u64)]) -> TransferGraph {
        let transfers: Vec<TransferRecord> =
            edges.iter().map(|(f, t, a)| transfer(f, t, *a)).collect();
        build_graph(&transfers).unwrap()
    }

    fn motifs(graph: &TransferGraph, excluded: &[&str]) -> MotifExtraction {
        let ids: Vec<NodeId> = excluded.iter().map(|a| graph.node_id(a).unwrap()).collect();
        let excluded = ExcludedNodes::from_ids(graph.node_count(), &ids);
        extract_motif_features(graph, &excluded, None)
    }

    fn of<'a>(graph: &TransferGraph, result: &'a MotifExtraction, address: &str) -> &'a MotifFeatures {
        result.features[graph.node_id(address).unwrap() as usize]
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_triangle_counted_once_for_each_participant() {
        let graph = graph_of(&[("A", "B", 1), ("B", "C", 2), ("C", "A", 3), ("D", "E", 9)]);
        let result = motifs(&graph, &[]);

        for address in ["A", "B", "C"] {
            let f = of(&graph, &result, address);
            assert_eq!(f.triangle_loop_count, 1, "{}", address);
            assert_eq!(f.triangle_loop_amount, 6.0);
            assert_eq!(f.triangle_loop_tx_count, 3);
        }
        for address in ["D", "E"] {
            assert_eq!(of(&graph, &result, address).triangle_loop_count, 0);
        }
        assert_eq!(result.diagnostics.triangles, 1);
    }

    #[test]
    fn test_triangle_against_id_order_is_found() {
        // Ids come out as A < Z < B < C; the cycle runs A -> C -> B -> A.
        let graph = graph_of(&[
            ("A", "Z", 1),
            ("B", "Z", 1),
            ("C", "Z", 1),
            ("A", "C", 1),
            ("C", "B", 1),
            ("B", "A", 1),
        ]);
        let result = motifs(&graph, &[]);

        assert_eq!(result.diagnostics.triangles, 1);
        for address in ["A", "B", "C"] {
            assert_eq!(of(&graph, &result, address).triangle_loop_count, 1);
        }
        assert_eq!(of(&graph, &result, "Z").triangle_loop_count, 0);
    }

    #[test]
    fn test_reciprocal_pair_symmetry() {
        let graph = graph_of(&[("A", "B", 10), ("B", "A", 5)]);
        let result = motifs(&graph, &[]);

        let a = of(&graph, &result, "A");
        let b = of(&graph, &result, "B");
        assert_eq!(a.two_node_loop_count, 1);
        assert_eq!(b.two_node_loop_count, 1);
        assert_eq!(a.two_node_loop_amount, 15.0);
        assert_eq!(b.two_node_loop_amount, 15.0);
        assert_eq!(a.two_node_loop_tx_count, 2);
        assert_eq!(a.triangle_loop_count, 0);
    }

    #[test]
    fn test_mixed_scenario_counts_canonical_triangle_once() {
        let graph = graph_of(&[("A", "B", 10), ("B", "A", 5), ("B", "C", 1), ("C", "A", 1)]);
        let result = motifs(&graph, &[]);

        let a = of(&graph, &result, "A");
        assert_eq!(a.two_node_loop_count, 1);
        assert_eq!(a.two_node_loop_amount, 15.0);
        for address in ["A", "B", "C"] {
            let f = of(&graph, &result, address);
            assert_eq!(f.triangle_loop_count, 1);
            assert_eq!(f.triangle_loop_amount, 12.0);
        }
        assert_eq!(of(&graph, &result, "C").two_node_loop_count, 0);
        assert_eq!(result.diagnostics.triangles, 1);
    }

    #[test]
    fn test_self_loop_is_not_a_two_node_loop() {
        let graph = graph_of(&[("A", "A", 4), ("A", "B", 1)]);
        let result = motifs(&graph, &[]);

        let a = of(&graph, &result, "A");
        assert_eq!(a.self_loop_count, 1);
        assert_eq!(a.two_node_loop_count, 0);
        assert_eq!(of(&graph, &result, "B").self_loop_count, 0);
    }

    #[test]
    fn test_excluded_node_is_invisible_to_others() {
        let edges = [
            ("A", "B", 1),
            ("B", "X", 1),
            ("X", "A", 1),
            ("A", "X", 1),
            ("B", "A", 1),
        ];
        let graph = graph_of(&edges);

        let full = motifs(&graph, &[]);
        let filtered = motifs(&graph, &["X"]);

        assert!(filtered.features[graph.node_id("X").unwrap() as usize].is_none());
        assert_eq!(of(&graph, &full, "A").triangle_loop_count, 1);
        assert_eq!(of(&graph, &filtered, "A").triangle_loop_count, 0);
        assert_eq!(of(&graph, &full, "A").two_node_loop_count, 2);
        assert_eq!(of(&graph, &filtered, "A").two_node_loop_count, 1);

        for address in ["A", "B"] {
            let before = of(&graph, &full, address);
            let after = of(&graph, &filtered, address);
            assert!(after.two_node_loop_count <= before.two_node_loop_count);
            assert!(after.two_node_loop_amount <= before.two_node_loop_amount);
            assert!(after.triangle_loop_count <= before.triangle_loop_count);
            assert!(after.triangle_loop_amount <= before.triangle_loop_amount);
        }
    }

    #[test]
    fn test_out_degree_cap_skips_hub_triangles() {
        let graph = graph_of(&[
            ("A", "B", 1),
            ("B", "C", 1),
            ("C", "A", 1),
            ("A", "D", 1),
            ("A", "E", 1),
        ]);
        let excluded = ExcludedNodes::none(graph.node_count());

        let capped = extract_motif_features(&graph, &excluded, Some(2));
        assert_eq!(capped.diagnostics.capped_nodes, vec![graph.node_id("A").unwrap()]);
        assert_eq!(capped.diagnostics.triangles, 0);
        assert_eq!(of(&graph, &capped, "B").triangle_loop_count, 0);

        let uncapped = extract_motif_features(&graph, &excluded, Some(3));
        assert!(uncapped.diagnostics.capped_nodes.is_empty());
        assert_eq!(uncapped.diagnostics.triangles, 1);
    }

    #[test]
    fn test_both_orientations_of_a_triple_count_once() {
        // Ids follow first appearance: A < B < C.
        let graph = graph_of(&[
            ("A", "B", 1),
            ("B", "C", 2),
            ("C", "A", 3),
            ("A", "C", 10),
            ("C", "B", 20),
            ("B", "A", 30),
        ]);
        let result = motifs(&graph, &[]);
        assert_eq!(result.diagnostics.triangles, 1);
        for address in ["A", "B", "C"] {
            let f = of(&graph, &result, address);
            assert_eq!(f.triangle_loop_count, 1, "{}", address);
            assert_eq!(f.triangle_loop_amount, 6.0);
            assert_eq!(f.triangle_loop_tx_count, 3);
            assert_eq!(f.two_node_loop_count, 2);
        }
    }
}
