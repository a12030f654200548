pub mod engine;
pub mod rules;
pub mod thresholds;
pub mod types;
