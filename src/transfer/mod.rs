pub mod filter;
pub mod loader;
pub mod types;
