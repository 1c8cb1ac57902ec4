//! Drain Deterministic Simulation Testing Harness
//!
//! Drives a `ServerState` over an in-memory store with a seeded random mix
//! of submits, drains and config changes, checking after every step:
//!
//! - **Counter**: with no drain in between, the buffer counter equals the
//!   number of logs submitted, and the number of buffered logs
//! - **Drain**: afterwards the buffer is empty, the counter is zero and the
//!   pool holds `before - evicted + buffered` logs
//! - **Eviction bound**: `evicted` is within `[0, pool size before]` and
//!   matches `eviction_count` for the config in force
//!
//! With `fault_prob > 0` some submits and drains run against an injected
//! store fault (see `StoreFault`). A failed submit counts only the logs it
//! wrote; a failed drain leaves the counter alone, and the next clean drain
//! takes whatever the buffer still holds.
//!
//! Log names are unique per run, so pool sizes are exact.

use super::{eviction_count, Area, InMemoryLogStore, LogBatch, StoreFault};
use crate::production::{RuntimeConfig, ServerState};
use bytes::Bytes;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Result of a single DST run
#[derive(Debug)]
pub struct DrainDSTResult {
    pub seed: u64,
    pub submits: usize,
    pub drains: usize,
    pub config_changes: usize,
    pub faults: usize,
    pub logs_submitted: usize,
    pub logs_evicted: usize,
    pub passed: bool,
    pub error_message: Option<String>,
}

/// Configuration for the drain DST harness
#[derive(Debug, Clone)]
pub struct DrainDSTConfig {
    /// Operations per run
    pub num_ops: usize,
    /// Largest submit batch
    pub max_batch: usize,
    pub drain_prob: f64,
    pub reconfig_prob: f64,
    /// Chance a submit or drain runs with a store fault armed
    pub fault_prob: f64,
}

impl Default for DrainDSTConfig {
    fn default() -> Self {
        DrainDSTConfig {
            num_ops: 200,
            max_batch: 8,
            drain_prob: 0.15,
            reconfig_prob: 0.05,
            fault_prob: 0.0,
        }
    }
}

impl DrainDSTConfig {
    /// Drains rarely, so the pool and buffer grow large
    pub fn accumulate() -> Self {
        DrainDSTConfig {
            drain_prob: 0.03,
            max_batch: 32,
            ..Default::default()
        }
    }

    /// Drains often, frequently on an empty buffer
    pub fn churn() -> Self {
        DrainDSTConfig {
            drain_prob: 0.5,
            max_batch: 2,
            ..Default::default()
        }
    }

    /// Store writes, promotes and evictions fail now and then
    pub fn faulty() -> Self {
        DrainDSTConfig {
            drain_prob: 0.25,
            fault_prob: 0.2,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Tally {
    submits: usize,
    drains: usize,
    config_changes: usize,
    faults: usize,
    logs_submitted: usize,
    logs_evicted: usize,
}

/// Drain DST Harness
pub struct DrainDSTHarness {
    seed: u64,
    rng: ChaCha8Rng,
    config: DrainDSTConfig,
    next_name: u64,
}

impl DrainDSTHarness {
    pub fn new(seed: u64, config: DrainDSTConfig) -> Self {
        DrainDSTHarness {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            next_name: 0,
        }
    }

    /// Run a single DST scenario
    pub fn run(&mut self) -> DrainDSTResult {
        let mut tally = Tally::default();
        let outcome = self.run_ops(&mut tally);
        DrainDSTResult {
            seed: self.seed,
            submits: tally.submits,
            drains: tally.drains,
            config_changes: tally.config_changes,
            faults: tally.faults,
            logs_submitted: tally.logs_submitted,
            logs_evicted: tally.logs_evicted,
            passed: outcome.is_ok(),
            error_message: outcome.err(),
        }
    }

    fn random_config(&mut self) -> RuntimeConfig {
        RuntimeConfig::new(
            self.rng.gen_range(0.0..0.99),
            self.rng.gen_range(0.0..0.99),
            self.rng.gen_range(1..=64),
        )
    }

    fn should_fault(&mut self) -> bool {
        self.config.fault_prob > 0.0 && self.rng.gen_bool(self.config.fault_prob)
    }

    fn run_ops(&mut self, tally: &mut Tally) -> Result<(), String> {
        let store = InMemoryLogStore::new();
        let initial = self.random_config();
        let state = ServerState::with_seed(store.clone(), initial, self.rng.next_u64());
        let mut expected_buffered = 0u64;

        for op in 0..self.config.num_ops {
            let roll: f64 = self.rng.gen();
            if roll < self.config.drain_prob {
                if self.should_fault() {
                    let fault = if self.rng.gen_bool(0.5) {
                        StoreFault::Promote
                    } else {
                        StoreFault::Evict
                    };
                    store.inject_fault(fault, self.rng.gen_range(0..4));
                }
                let drained = self.drain_step(op, &store, &state, tally);
                store.clear_fault();
                drained?;
                expected_buffered = 0;
            } else if roll < self.config.drain_prob + self.config.reconfig_prob {
                let next = self.random_config();
                state
                    .set_config(next)
                    .map_err(|e| format!("op {}: set_config failed: {}", op, e))?;
                check(state.runtime_config() == next, op, || {
                    "config not replaced".to_string()
                })?;
                tally.config_changes += 1;
            } else {
                let n = self.rng.gen_range(1..=self.config.max_batch.max(1));
                let logs: LogBatch = (0..n)
                    .map(|_| {
                        self.next_name += 1;
                        let body = Bytes::from(self.next_name.to_le_bytes().to_vec());
                        (format!("{}.json.gz", self.next_name), body)
                    })
                    .collect();

                let armed = self.should_fault();
                if armed {
                    store.inject_fault(StoreFault::Write, self.rng.gen_range(0..n));
                }
                let result = state.submit(&logs);
                store.clear_fault();
                tally.submits += 1;

                let written = store.count(Area::Buffer) as u64 - expected_buffered;
                match result {
                    Ok(count) => {
                        check(!armed && written == n as u64, op, || {
                            format!("submit of {} logs wrote {}", n, written)
                        })?;
                        check(count == expected_buffered + written, op, || {
                            format!("returned counter {} after {} logs", count, written)
                        })?;
                    }
                    Err(_) => {
                        check(armed && written < n as u64, op, || {
                            format!("failed submit of {} logs wrote {}", n, written)
                        })?;
                        tally.faults += 1;
                    }
                }
                expected_buffered += written;
                tally.logs_submitted += written as usize;

                check(state.buffer_count() == expected_buffered, op, || {
                    format!(
                        "buffer counter {} != logs written {}",
                        state.buffer_count(),
                        expected_buffered
                    )
                })?;
                check(store.count(Area::Buffer) as u64 == expected_buffered, op, || {
                    format!(
                        "buffer holds {} logs, counter says {}",
                        store.count(Area::Buffer),
                        expected_buffered
                    )
                })?;
            }
        }
        Ok(())
    }

    /// One drain, plus a clean recovery drain if a fault fired.
    fn drain_step(
        &self,
        op: usize,
        store: &InMemoryLogStore,
        state: &ServerState,
        tally: &mut Tally,
    ) -> Result<(), String> {
        let pool_before = store.count(Area::Drain);
        let buffered_before = store.count(Area::Buffer);
        let counter_before = state.buffer_count();
        let expected_evict = eviction_count(pool_before, buffered_before, &state.runtime_config());
        tally.drains += 1;

        let outcome = match state.drain() {
            Ok(outcome) => outcome,
            Err(_) => {
                tally.faults += 1;
                check(state.buffer_count() == counter_before, op, || {
                    format!(
                        "failed drain changed the counter {} -> {}",
                        counter_before,
                        state.buffer_count()
                    )
                })?;

                store.clear_fault();
                let left = store.count(Area::Buffer);
                let recovery = state
                    .drain()
                    .map_err(|e| format!("op {}: recovery drain failed: {}", op, e))?;
                check(recovery.count == left, op, || {
                    format!("recovery drained {} of {} left", recovery.count, left)
                })?;
                tally.logs_evicted += recovery.evicted;
                return self.check_drained(op, store, state);
            }
        };

        check(outcome.count == buffered_before, op, || {
            format!("drain count {} != buffered {}", outcome.count, buffered_before)
        })?;
        if buffered_before == 0 {
            check(outcome.evicted == 0 && outcome.pool_size.is_none(), op, || {
                "empty drain changed state".to_string()
            })?;
            check(store.count(Area::Drain) == pool_before, op, || {
                "empty drain touched the pool".to_string()
            })?;
            return Ok(());
        }

        check(outcome.evicted <= pool_before, op, || {
            format!("evicted {} > pool {}", outcome.evicted, pool_before)
        })?;
        check(outcome.evicted == expected_evict, op, || {
            format!("evicted {} != expected {}", outcome.evicted, expected_evict)
        })?;
        let expected_pool = pool_before - outcome.evicted + buffered_before;
        check(outcome.pool_size == Some(expected_pool), op, || {
            format!("pool_size {:?} != {}", outcome.pool_size, expected_pool)
        })?;
        check(store.count(Area::Drain) == expected_pool, op, || {
            format!(
                "pool holds {} logs, expected {}",
                store.count(Area::Drain),
                expected_pool
            )
        })?;

        tally.logs_evicted += outcome.evicted;
        self.check_drained(op, store, state)
    }

    fn check_drained(
        &self,
        op: usize,
        store: &InMemoryLogStore,
        state: &ServerState,
    ) -> Result<(), String> {
        let stats = state
            .stats()
            .map_err(|e| format!("op {}: stats failed: {}", op, e))?;
        check(store.count(Area::Buffer) == 0 && stats.buffer_count == 0, op, || {
            "buffer not empty after drain".to_string()
        })?;
        check(stats.drain_pool_size == store.count(Area::Drain), op, || {
            format!(
                "stats pool {} != store pool {}",
                stats.drain_pool_size,
                store.count(Area::Drain)
            )
        })
    }
}

fn check(cond: bool, op: usize, msg: impl FnOnce() -> String) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(format!("op {}: {}", op, msg()))
    }
}

/// Run DST across a range of seeds
pub fn run_drain_dst_batch(
    seeds: std::ops::Range<u64>,
    config: DrainDSTConfig,
) -> Vec<DrainDSTResult> {
    seeds
        .map(|seed| DrainDSTHarness::new(seed, config.clone()).run())
        .collect()
}

/// Summarize batch results
pub fn summarize_drain_dst_batch(results: &[DrainDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    let drains: usize = results.iter().map(|r| r.drains).sum();
    let faults: usize = results.iter().map(|r| r.faults).sum();
    let submitted: usize = results.iter().map(|r| r.logs_submitted).sum();
    let evicted: usize = results.iter().map(|r| r.logs_evicted).sum();

    let mut summary = format!(
        "Drain DST Batch: {}/{} passed ({} failed)\n\
         Drains: {}, Faults: {}, Logs submitted: {}, Logs evicted: {}",
        passed, total, failed, drains, faults, submitted, evicted
    );

    if failed > 0 {
        summary.push_str("\n\nFailed seeds:");
        for r in results.iter().filter(|r| !r.passed) {
            summary.push_str(&format!(
                "\n  Seed {}: {}",
                r.seed,
                r.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    summary
}
