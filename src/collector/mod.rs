pub mod runner;
pub mod store;

pub use runner::{process_result, run_sweeper, spawn_consumers, sweep_once, CollectorError};
pub use store::{AggregationStore, ExpiredGroup, Outcome, StoreError, StoreStats};
