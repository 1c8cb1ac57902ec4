//! Server context shared by every connection
//!
//! Two coarse locks:
//!
//! - **directory lock**: log store, buffer counter, runtime config
//! - **parameter lock**: the parameter triple (inside `ParameterStore`)
//!
//! When both are needed the directory lock is taken first. Only
//! `ready_to_serve` (and so `fetch_params`) and `stats` take both; keep it
//! that way.

use super::params::{ParameterStore, ParameterTriple};
use super::runtime_config::RuntimeConfig;
use crate::error::{ConfigError, StoreError};
use crate::storage::{run_drain, Area, DrainOutcome, LogBatch, LogStore};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

struct DirectoryState {
    store: Box<dyn LogStore>,
    /// Logs submitted since the last drain
    buffer_count: u64,
    config: RuntimeConfig,
    rng: ChaCha8Rng,
}

struct Inner {
    directory: Mutex<DirectoryState>,
    params: ParameterStore,
}

/// Point-in-time view for logs and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateStats {
    pub buffer_count: u64,
    pub drain_pool_size: usize,
    pub capacity: u64,
    pub params_present: bool,
}

#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

impl ServerState {
    pub fn new<S: LogStore>(store: S, config: RuntimeConfig) -> Self {
        Self::with_rng(store, config, ChaCha8Rng::from_entropy())
    }

    /// Deterministic eviction sampling for tests and simulation
    pub fn with_seed<S: LogStore>(store: S, config: RuntimeConfig, seed: u64) -> Self {
        Self::with_rng(store, config, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng<S: LogStore>(store: S, config: RuntimeConfig, rng: ChaCha8Rng) -> Self {
        debug_assert!(config.validate().is_ok(), "Precondition: runtime config must be valid");
        ServerState {
            inner: Arc::new(Inner {
                directory: Mutex::new(DirectoryState {
                    store: Box::new(store),
                    buffer_count: 0,
                    config,
                    rng,
                }),
                params: ParameterStore::new(),
            }),
        }
    }

    /// Write logs into the buffer and bump the counter by one per log.
    /// Names are unique within a batch, so the counter tracks distinct
    /// buffered names.
    ///
    /// On a failed write the logs already written stay buffered and are
    /// counted; the error is returned.
    pub fn submit(&self, logs: &LogBatch) -> Result<u64, StoreError> {
        let mut dir = self.inner.directory.lock();
        let mut written = 0u64;
        let mut result = Ok(());
        for (name, content) in logs {
            if let Err(e) = dir.store.write_buffered(name, content) {
                result = Err(e);
                break;
            }
            written += 1;
        }
        dir.buffer_count = dir.buffer_count.saturating_add(written);
        info!("total buffer size: {}", dir.buffer_count);
        result.map(|()| dir.buffer_count)
    }

    /// Evict part of the drain pool, promote the whole buffer, reset the
    /// counter. A no-op when the buffer is empty.
    pub fn drain(&self) -> Result<DrainOutcome, StoreError> {
        let mut dir = self.inner.directory.lock();
        let DirectoryState {
            store,
            buffer_count,
            config,
            rng,
        } = &mut *dir;

        let outcome = run_drain(&**store, config, rng)?;
        if outcome.count > 0 {
            *buffer_count = 0;
            info!("total buffer size: {}", buffer_count);
        }
        Ok(outcome)
    }

    /// Replace all three runtime knobs at once. Invalid values are rejected
    /// without touching the current config.
    pub fn set_config(&self, config: RuntimeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut dir = self.inner.directory.lock();
        dir.config = config;
        info!("sample_reuse_rate = {}", dir.config.sample_reuse_rate);
        info!("sample_reuse_threshold = {}", dir.config.sample_reuse_threshold);
        info!("capacity = {}", dir.config.capacity);
        Ok(())
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        self.inner.directory.lock().config
    }

    pub fn buffer_count(&self) -> u64 {
        self.inner.directory.lock().buffer_count
    }

    pub fn replace_params(&self, triple: ParameterTriple) {
        self.inner.params.replace(triple);
    }

    pub fn snapshot_params(&self) -> Option<ParameterTriple> {
        self.inner.params.snapshot()
    }

    /// Buffer below capacity and parameters present.
    /// Directory lock, then parameter lock.
    pub fn ready_to_serve(&self) -> bool {
        let dir = self.inner.directory.lock();
        let overflow = dir.buffer_count >= dir.config.capacity;
        let has_params = self.inner.params.is_present();
        drop(dir);
        has_params && !overflow
    }

    /// Parameters for a worker, or `None` to tell it to come back later
    pub fn fetch_params(&self) -> Option<ParameterTriple> {
        if !self.ready_to_serve() {
            return None;
        }
        self.snapshot_params()
    }

    /// Directory lock, then parameter lock.
    pub fn stats(&self) -> Result<StateStats, StoreError> {
        let dir = self.inner.directory.lock();
        let drain_pool_size = dir.store.list(Area::Drain)?.len();
        let params_present = self.inner.params.is_present();
        Ok(StateStats {
            buffer_count: dir.buffer_count,
            drain_pool_size,
            capacity: dir.config.capacity,
            params_present,
        })
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = self.inner.directory.lock();
        f.debug_struct("ServerState")
            .field("buffer_count", &dir.buffer_count)
            .field("config", &dir.config)
            .field("drain_location", &dir.store.drain_location())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryLogStore, StoreFault};
    use bytes::Bytes;

    fn logs(prefix: &str, n: usize) -> LogBatch {
        (0..n)
            .map(|i| (format!("{}{}", prefix, i), Bytes::from(format!("log {}", i))))
            .collect()
    }

    fn triple() -> ParameterTriple {
        ParameterTriple::new(&b"A"[..], &b"B"[..], &b"C"[..])
    }

    #[test]
    fn test_submit_counts_items() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store.clone(), RuntimeConfig::default(), 1);

        assert_eq!(state.submit(&logs("a", 3)).unwrap(), 3);
        assert_eq!(state.submit(&logs("b", 2)).unwrap(), 5);
        assert_eq!(state.buffer_count(), 5);
        assert_eq!(store.count(Area::Buffer), 5);
    }

    #[test]
    fn test_submit_partial_failure_counts_written() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store.clone(), RuntimeConfig::default(), 1);

        store.inject_fault(StoreFault::Write, 1);
        assert!(matches!(state.submit(&logs("a", 3)), Err(StoreError::Io(_))));
        assert_eq!(state.buffer_count(), 1);
        assert_eq!(store.count(Area::Buffer), 1);

        // Writes stop at the first invalid name
        store.clear_fault();
        let mut batch = logs("ok", 1);
        batch.insert("../bad".to_string(), Bytes::from_static(b"2"));
        assert!(matches!(state.submit(&batch), Err(StoreError::InvalidName(_))));
        assert_eq!(state.buffer_count(), 1);
        assert_eq!(store.count(Area::Buffer), 1);
    }

    #[test]
    fn test_batch_names_are_distinct() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store.clone(), RuntimeConfig::new(0.0, 0.0, 2), 1);
        state.replace_params(triple());

        let mut batch = LogBatch::new();
        batch.insert("x".to_string(), Bytes::from_static(b"1"));
        batch.insert("x".to_string(), Bytes::from_static(b"2"));
        assert_eq!(state.submit(&batch).unwrap(), 1);

        assert_eq!(state.buffer_count() as usize, store.count(Area::Buffer));
        assert_eq!(store.read(Area::Buffer, "x").unwrap(), Bytes::from_static(b"2"));
        assert!(state.ready_to_serve());
    }

    #[test]
    fn test_failed_drain_keeps_counter() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store.clone(), RuntimeConfig::default(), 1);
        state.submit(&logs("a", 3)).unwrap();

        store.inject_fault(StoreFault::Promote, 1);
        assert!(state.drain().is_err());
        assert_eq!(state.buffer_count(), 3);

        store.clear_fault();
        let outcome = state.drain().unwrap();
        assert_eq!(outcome.count, 2);
        assert_eq!(state.buffer_count(), 0);
        assert_eq!(store.count(Area::Drain), 3);
    }

    #[test]
    fn test_drain_resets_counter() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store.clone(), RuntimeConfig::new(0.5, 0.8, 10), 9);
        for i in 0..7 {
            store.seed_drained(&format!("old{}", i), b"x");
        }
        state.submit(&logs("new", 3)).unwrap();

        let outcome = state.drain().unwrap();
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.pool_size, Some(7));
        assert_eq!(state.buffer_count(), 0);
        assert_eq!(store.count(Area::Buffer), 0);
        assert_eq!(state.stats().unwrap().drain_pool_size, 7);
    }

    #[test]
    fn test_drain_empty_buffer() {
        let store = InMemoryLogStore::new();
        let state = ServerState::with_seed(store, RuntimeConfig::default(), 1);
        let outcome = state.drain().unwrap();
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.drain_location, "memory://drain");
    }

    #[test]
    fn test_params_absent_until_submitted() {
        let config = RuntimeConfig::new(0.0, 0.0, 10);
        let state = ServerState::with_seed(InMemoryLogStore::new(), config, 1);
        state.submit(&logs("a", 5)).unwrap();
        assert_eq!(state.buffer_count(), 5);
        assert!(state.fetch_params().is_none());

        state.replace_params(triple());
        assert_eq!(state.fetch_params(), Some(triple()));
    }

    #[test]
    fn test_overflow_refuses_params() {
        let config = RuntimeConfig::new(0.0, 0.0, 5);
        let state = ServerState::with_seed(InMemoryLogStore::new(), config, 1);
        state.replace_params(triple());
        state.submit(&logs("a", 4)).unwrap();
        assert!(state.ready_to_serve());

        state.submit(&logs("b", 1)).unwrap();
        assert!(!state.ready_to_serve());
        assert!(state.fetch_params().is_none());

        state.drain().unwrap();
        assert!(state.ready_to_serve());
    }

    #[test]
    fn test_set_config_replaces_all_fields() {
        let state = ServerState::with_seed(InMemoryLogStore::new(), RuntimeConfig::default(), 1);
        let next = RuntimeConfig::new(0.25, 0.75, 3);
        state.set_config(next).unwrap();
        assert_eq!(state.runtime_config(), next);
    }

    #[test]
    fn test_set_config_rejects_invalid() {
        let state = ServerState::with_seed(InMemoryLogStore::new(), RuntimeConfig::default(), 1);
        assert!(state.set_config(RuntimeConfig::new(0.5, 1.5, 3)).is_err());
        assert_eq!(state.runtime_config(), RuntimeConfig::default());
    }
}
