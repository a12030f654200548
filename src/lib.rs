pub mod anomaly;
pub mod artifacts;
pub mod config;
pub mod entity;
pub mod error;
pub mod features;
pub mod graph;
pub mod pipeline;
pub mod scoring;
pub mod transfer;
