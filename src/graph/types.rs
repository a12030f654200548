//! Directed transfer graph: an address arena plus compressed adjacency.
//!
//! Edges are aggregated (one per ordered address pair) and stored sorted by
//! `(source, target)`, so the edge array doubles as the CSR column array for
//! outbound adjacency. A second CSR indexes inbound adjacency.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::entity::infra::ExclusionSet;
use crate::transfer::types::decimal_string;

/// Contiguous vertex id in `0..node_count`.
pub type NodeId = u32;

/// All raw transfers between one ordered address pair, folded into one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    pub transfer_count: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub first_seen: DateTime<Utc>,
    pub token_id: String,
}

/// Serialized form of a [`TransferGraph`]; the adjacency index is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub addresses: Vec<String>,
    pub edges: Vec<AggregatedEdge>,
}

#[derive(Debug, Clone)]
pub struct TransferGraph {
    addresses: Vec<String>,
    index: HashMap<String, NodeId>,
    edges: Vec<AggregatedEdge>,
    /// Edge amounts as floats for motif arithmetic.
    amounts: Vec<f64>,
    /// Outbound CSR: edges `out_offsets[v]..out_offsets[v + 1]` leave `v`.
    out_offsets: Vec<usize>,
    out_targets: Vec<NodeId>,
    /// Inbound CSR: sources sorted ascending, with the matching edge ids.
    in_offsets: Vec<usize>,
    in_sources: Vec<NodeId>,
    in_edge_ids: Vec<usize>,
}

impl TransferGraph {
    /// Assemble a graph from an address arena and aggregated edges.
    ///
    /// Edges may arrive in any order; they are sorted by `(source, target)`.
    /// Callers guarantee at most one edge per ordered pair and that every
    /// endpoint indexes into `addresses`.
    pub fn from_parts(addresses: Vec<String>, mut edges: Vec<AggregatedEdge>) -> Self {
        let n = addresses.len();
        edges.sort_by_key(|e| (e.source, e.target));

        let index = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i as NodeId))
            .collect();

        let amounts = edges
            .iter()
            .map(|e| e.amount.to_f64().unwrap_or(0.0))
            .collect();

        let mut out_offsets = vec![0usize; n + 1];
        let mut in_offsets = vec![0usize; n + 1];
        for e in &edges {
            out_offsets[e.source as usize + 1] += 1;
            in_offsets[e.target as usize + 1] += 1;
        }
        for i in 0..n {
            out_offsets[i + 1] += out_offsets[i];
            in_offsets[i + 1] += in_offsets[i];
        }

        let out_targets = edges.iter().map(|e| e.target).collect();

        // Edges are visited in ascending source order, so each inbound row ends up sorted.
        let mut in_sources = vec![0 as NodeId; edges.len()];
        let mut in_edge_ids = vec![0usize; edges.len()];
        let mut cursor = in_offsets.clone();
        for (id, e) in edges.iter().enumerate() {
            let pos = cursor[e.target as usize];
            in_sources[pos] = e.source;
            in_edge_ids[pos] = id;
            cursor[e.target as usize] += 1;
        }

        Self {
            addresses,
            index,
            edges,
            amounts,
            out_offsets,
            out_targets,
            in_offsets,
            in_sources,
            in_edge_ids,
        }
    }

    /// Rebuild a graph from its artifact, rejecting artifacts that break the
    /// arena or one-edge-per-pair invariants.
    pub fn from_artifact(artifact: GraphArtifact) -> eyre::Result<Self> {
        let n = artifact.addresses.len();
        let mut seen = HashSet::with_capacity(n);
        if let Some(dup) = artifact.addresses.iter().find(|a| !seen.insert(a.as_str())) {
            return Err(eyre::eyre!("Graph artifact lists address '{}' twice", dup));
        }

        let mut pairs = HashSet::with_capacity(artifact.edges.len());
        for e in &artifact.edges {
            if e.source as usize >= n || e.target as usize >= n {
                return Err(eyre::eyre!(
                    "Graph artifact edge {} -> {} is outside {} addresses",
                    e.source,
                    e.target,
                    n
                ));
            }
            if !pairs.insert((e.source, e.target)) {
                return Err(eyre::eyre!(
                    "Graph artifact has duplicate edge {} -> {}",
                    e.source,
                    e.target
                ));
            }
        }
        Ok(Self::from_parts(artifact.addresses, artifact.edges))
    }

    pub fn to_artifact(&self) -> GraphArtifact {
        GraphArtifact {
            addresses: self.addresses.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn address(&self, node: NodeId) -> &str {
        &self.addresses[node as usize]
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn node_id(&self, address: &str) -> Option<NodeId> {
        self.index.get(address).copied()
    }

    pub fn edges(&self) -> &[AggregatedEdge] {
        &self.edges
    }

    pub fn edge(&self, id: usize) -> &AggregatedEdge {
        &self.edges[id]
    }

    pub fn edge_amount(&self, id: usize) -> f64 {
        self.amounts[id]
    }

    /// Edge ids leaving `node`, ordered by target.
    pub fn out_edge_ids(&self, node: NodeId) -> Range<usize> {
        let v = node as usize;
        self.out_offsets[v]..self.out_offsets[v + 1]
    }

    /// Targets of `node`'s outbound edges, sorted ascending.
    pub fn out_neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.out_targets[self.out_edge_ids(node)]
    }

    /// Sources of `node`'s inbound edges, sorted ascending.
    pub fn in_neighbors(&self, node: NodeId) -> &[NodeId] {
        let v = node as usize;
        &self.in_sources[self.in_offsets[v]..self.in_offsets[v + 1]]
    }

    /// Edge ids entering `node`, in the same order as [`Self::in_neighbors`].
    pub fn in_edge_ids(&self, node: NodeId) -> &[usize] {
        let v = node as usize;
        &self.in_edge_ids[self.in_offsets[v]..self.in_offsets[v + 1]]
    }

    /// Id of the edge `source -> target`, if present.
    pub fn find_edge(&self, source: NodeId, target: NodeId) -> Option<usize> {
        let range = self.out_edge_ids(source);
        let start = range.start;
        self.out_targets[range]
            .binary_search(&target)
            .ok()
            .map(|pos| start + pos)
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.find_edge(source, target).is_some()
    }
}

/// Per-vertex exclusion flags derived from an [`ExclusionSet`].
///
/// Excluded vertices are never a center of motif/egonet computation and are
/// invisible as neighbors of every other vertex.
#[derive(Debug, Clone)]
pub struct ExcludedNodes {
    mask: Vec<bool>,
    count: usize,
}

impl ExcludedNodes {
    pub fn none(node_count: usize) -> Self {
        Self {
            mask: vec![false; node_count],
            count: 0,
        }
    }

    pub fn from_ids(node_count: usize, ids: &[NodeId]) -> Self {
        let mut excluded = Self::none(node_count);
        for &id in ids {
            if !excluded.mask[id as usize] {
                excluded.mask[id as usize] = true;
                excluded.count += 1;
            }
        }
        excluded
    }

    pub fn from_set(graph: &TransferGraph, set: &ExclusionSet) -> Self {
        let mut ids = Vec::new();
        for v in 0..graph.node_count() as NodeId {
            if let Some(infra) = set.lookup(graph.address(v)) {
                tracing::debug!(
                    address = graph.address(v),
                    label = %infra.label,
                    source = %infra.source,
                    "Excluding infra node"
                );
                ids.push(v);
            }
        }
        tracing::info!(
            matched = ids.len(),
            whitelist = set.len(),
            "Whitelist matched against graph"
        );
        Self::from_ids(graph.node_count(), &ids)
    }

    pub fn is_excluded(&self, node: NodeId) -> bool {
        self.mask[node as usize]
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
