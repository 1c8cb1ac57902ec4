//! Latest model parameters handed out to workers

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The three model components a worker needs. Opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterTriple {
    pub oracle: Bytes,
    pub mortal: Bytes,
    pub dqn: Bytes,
}

impl ParameterTriple {
    pub fn new(oracle: impl Into<Bytes>, mortal: impl Into<Bytes>, dqn: impl Into<Bytes>) -> Self {
        ParameterTriple {
            oracle: oracle.into(),
            mortal: mortal.into(),
            dqn: dqn.into(),
        }
    }

    /// All three blobs carry data
    pub fn is_complete(&self) -> bool {
        !self.oracle.is_empty() && !self.mortal.is_empty() && !self.dqn.is_empty()
    }
}

/// Holder of the current triple behind the parameter lock.
///
/// The triple is swapped as a whole, so a reader sees either the previous
/// or the next triple, never a mix.
#[derive(Debug, Default)]
pub struct ParameterStore {
    current: Mutex<Option<ParameterTriple>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, triple: ParameterTriple) {
        *self.current.lock() = Some(triple);
    }

    /// The current triple, or `None` if unset or any blob is empty.
    /// Cloning `Bytes` only bumps reference counts.
    pub fn snapshot(&self) -> Option<ParameterTriple> {
        self.current
            .lock()
            .as_ref()
            .filter(|triple| triple.is_complete())
            .cloned()
    }

    pub fn is_present(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, ParameterTriple::is_complete)
    }
}
