pub mod agreement;
pub mod combiner;
pub mod isolation;
pub mod percentile;
pub mod standardize;
pub mod statistical;
