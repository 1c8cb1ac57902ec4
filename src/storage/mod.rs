//! Buffer/drain log storage and the drain cycle

pub mod drain;
pub mod drain_dst;
pub mod log_store;

pub use drain::{eviction_count, run_drain, DrainOutcome};
pub use drain_dst::{
    run_drain_dst_batch, summarize_drain_dst_batch, DrainDSTConfig, DrainDSTHarness,
    DrainDSTResult,
};
pub use log_store::{
    validate_name, Area, InMemoryLogStore, LocalLogStore, LogBatch, LogStore, StoreFault,
};
