//! The merged per-account feature table.
//!
//! One row per graph vertex, in vertex order. Infra rows keep their address
//! and flag but carry no feature values.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScoringError;
use crate::graph::types::{ExcludedNodes, NodeId, TransferGraph};
use crate::transfer::types::decimal_string;

use super::degree::DegreeFeatures;
use super::egonet::EgonetFeatures;
use super::motif::MotifFeatures;

/// Columns every persisted feature table must carry, in write order.
pub const FEATURE_COLUMNS: &[&str] = &[
    "address",
    "is_infra",
    "in_degree",
    "out_degree",
    "unique_in_degree",
    "unique_out_degree",
    "total_input_amount",
    "total_output_amount",
    "balance_proxy",
    "self_loop_count",
    "two_node_loop_count",
    "two_node_loop_amount",
    "two_node_loop_tx_count",
    "triangle_loop_count",
    "triangle_loop_amount",
    "triangle_loop_tx_count",
    "egonet_node_count",
    "egonet_edge_count",
    "egonet_density",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
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
}

/// Numeric view of a scored (non-infra) row. Missing values read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccountMetrics {
    pub unique_in_degree: f64,
    pub unique_out_degree: f64,
    pub total_input_amount: f64,
    pub total_output_amount: f64,
    pub two_node_loop_count: f64,
    pub two_node_loop_amount: f64,
    pub two_node_loop_tx_count: f64,
    pub triangle_loop_count: f64,
    pub triangle_loop_amount: f64,
    pub triangle_loop_tx_count: f64,
    pub egonet_density: f64,
}

impl FeatureRow {
    /// An infra row: address and flag only.
    pub fn infra(address: String) -> Self {
        Self {
            address,
            is_infra: true,
            in_degree: None,
            out_degree: None,
            unique_in_degree: None,
            unique_out_degree: None,
            total_input_amount: None,
            total_output_amount: None,
            balance_proxy: None,
            self_loop_count: None,
            two_node_loop_count: None,
            two_node_loop_amount: None,
            two_node_loop_tx_count: None,
            triangle_loop_count: None,
            triangle_loop_amount: None,
            triangle_loop_tx_count: None,
            egonet_node_count: None,
            egonet_edge_count: None,
            egonet_density: None,
        }
    }

    fn scored(address: String, degree: DegreeFeatures, motif: MotifFeatures, egonet: EgonetFeatures) -> Self {
        Self {
            address,
            is_infra: false,
            in_degree: Some(degree.in_degree),
            out_degree: Some(degree.out_degree),
            unique_in_degree: Some(degree.unique_in_degree),
            unique_out_degree: Some(degree.unique_out_degree),
            total_input_amount: Some(degree.total_input_amount),
            total_output_amount: Some(degree.total_output_amount),
            balance_proxy: Some(degree.balance_proxy),
            self_loop_count: Some(motif.self_loop_count),
            two_node_loop_count: Some(motif.two_node_loop_count),
            two_node_loop_amount: Some(motif.two_node_loop_amount),
            two_node_loop_tx_count: Some(motif.two_node_loop_tx_count),
            triangle_loop_count: Some(motif.triangle_loop_count),
            triangle_loop_amount: Some(motif.triangle_loop_amount),
            triangle_loop_tx_count: Some(motif.triangle_loop_tx_count),
            egonet_node_count: Some(egonet.egonet_node_count),
            egonet_edge_count: Some(egonet.egonet_edge_count),
            egonet_density: Some(egonet.egonet_density),
        }
    }

    pub fn metrics(&self) -> AccountMetrics {
        let count = |v: Option<u64>| v.unwrap_or(0) as f64;
        let amount = |v: &Option<BigDecimal>| v.as_ref().and_then(|a| a.to_f64()).unwrap_or(0.0);
        AccountMetrics {
            unique_in_degree: count(self.unique_in_degree),
            unique_out_degree: count(self.unique_out_degree),
            total_input_amount: amount(&self.total_input_amount),
            total_output_amount: amount(&self.total_output_amount),
            two_node_loop_count: count(self.two_node_loop_count),
            two_node_loop_amount: self.two_node_loop_amount.unwrap_or(0.0),
            two_node_loop_tx_count: count(self.two_node_loop_tx_count),
            triangle_loop_count: count(self.triangle_loop_count),
            triangle_loop_amount: self.triangle_loop_amount.unwrap_or(0.0),
            triangle_loop_tx_count: count(self.triangle_loop_tx_count),
            egonet_density: self.egonet_density.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Join the three extractor outputs by vertex id.
    pub fn merge(
        graph: &TransferGraph,
        excluded: &ExcludedNodes,
        degree: Vec<Option<DegreeFeatures>>,
        motif: Vec<Option<MotifFeatures>>,
        egonet: Vec<Option<EgonetFeatures>>,
    ) -> eyre::Result<Self> {
        let n = graph.node_count();
        if degree.len() != n || motif.len() != n || egonet.len() != n {
            return Err(eyre::eyre!(
                "Feature index mismatch: graph has {} nodes, degree {}, motif {}, egonet {}",
                n,
                degree.len(),
                motif.len(),
                egonet.len()
            ));
        }

        let mut rows = Vec::with_capacity(n);
        for (v, ((d, m), e)) in degree.into_iter().zip(motif).zip(egonet).enumerate() {
            let address = graph.address(v as NodeId).to_string();
            let row = match (excluded.is_excluded(v as NodeId), d, m, e) {
                (true, _, _, _) => FeatureRow::infra(address),
                (false, Some(d), Some(m), Some(e)) => FeatureRow::scored(address, d, m, e),
                _ => {
                    return Err(eyre::eyre!(
                        "Missing features for non-infra account '{}'",
                        address
                    ))
                }
            };
            rows.push(row);
        }

        tracing::info!(
            rows = rows.len(),
            infra = excluded.count(),
            "Merged feature table"
        );
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Indices of non-infra rows, in table order.
    pub fn scored_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_infra)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> eyre::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        if self.rows.is_empty() {
            writer.write_record(FEATURE_COLUMNS)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a persisted feature table, failing fast on missing columns.
    pub fn read_csv(path: &Path) -> eyre::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| eyre::eyre!("Failed to open feature table '{}': {}", path.display(), e))?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        check_required_columns(&headers)?;

        let mut rows = Vec::new();
        for result in reader.deserialize::<FeatureRow>() {
            rows.push(result?);
        }
        tracing::info!(rows = rows.len(), path = %path.display(), "Loaded feature table");
        Ok(Self { rows })
    }
}

/// Fail with every missing column named, not just the first.
pub fn check_required_columns<S: AsRef<str>>(headers: &[S]) -> Result<(), ScoringError> {
    let missing: Vec<String> = FEATURE_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h.as_ref() == **col))
        .map(|col| col.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScoringError::MissingColumns { columns: missing })
    }
}
