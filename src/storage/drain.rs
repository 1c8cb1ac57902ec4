//! Drain Scheduler
//!
//! Moves every buffered log into the drain pool, first evicting a random
//! portion of the existing pool so old samples are not reused forever.
//!
//! ## Eviction arithmetic
//!
//! With `d` logs already drained, `b` logs buffered, reuse rate `r` and
//! reuse threshold `t`:
//!
//! ```text
//! to_delete = floor(max(d * (1 - r), d - b * t / (1 - t)))   clamped to [0, d]
//! ```
//!
//! The second term keeps `x / (b + x) = t` for the `x` old logs retained;
//! the first caps how much of the old pool survives a single cycle.

use super::log_store::{Area, LogStore};
use crate::error::StoreError;
use crate::production::RuntimeConfig;
use rand::Rng;
use tracing::info;

/// Result of one drain cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Logs moved from the buffer (0 means nothing happened)
    pub count: usize,
    /// Previously drained logs deleted
    pub evicted: usize,
    /// Drain pool size after the cycle; `None` when the buffer was empty
    pub pool_size: Option<usize>,
    pub drain_location: String,
}

/// Number of previously drained logs to evict, always within `[0, drain_count]`.
pub fn eviction_count(drain_count: usize, buffer_count: usize, config: &RuntimeConfig) -> usize {
    let d = drain_count as f64;
    let b = buffer_count as f64;
    let rate = config.sample_reuse_rate;
    let threshold = config.sample_reuse_threshold;

    let rate_bound = d * (1.0 - rate);
    let threshold_bound = d - (b * threshold) / (1.0 - threshold);

    // f64::max ignores a NaN operand; the final max(0.0) maps an all-NaN
    // result to zero
    let raw = rate_bound.max(threshold_bound).floor().max(0.0);
    let clamped = if raw >= d { drain_count } else { raw as usize };

    debug_assert!(clamped <= drain_count, "Postcondition: eviction within pool");
    clamped
}

/// Run one drain cycle against `store`. The caller holds the directory lock.
pub fn run_drain<S, R>(
    store: &S,
    config: &RuntimeConfig,
    rng: &mut R,
) -> Result<DrainOutcome, StoreError>
where
    S: LogStore + ?Sized,
    R: Rng + ?Sized,
{
    let buffer_list = store.list(Area::Buffer)?;
    let count = buffer_list.len();
    if count == 0 {
        return Ok(DrainOutcome {
            count: 0,
            evicted: 0,
            pool_size: None,
            drain_location: store.drain_location(),
        });
    }

    let drain_list = store.list(Area::Drain)?;
    let drain_count = drain_list.len();
    let to_delete = eviction_count(drain_count, count, config);
    info!("previously drained files to delete: {}", to_delete);

    for idx in rand::seq::index::sample(rng, drain_count, to_delete) {
        store.evict(&drain_list[idx])?;
    }
    for name in &buffer_list {
        store.promote(name)?;
    }

    // A promoted name can overwrite a surviving drained log, so the pool
    // may end up smaller than the arithmetic says
    let pool_size = drain_count - to_delete + count;
    info!("new drain files size: {}", pool_size);

    Ok(DrainOutcome {
        count,
        evicted: to_delete,
        pool_size: Some(pool_size),
        drain_location: store.drain_location(),
    })
}
