//! Shared "already written" counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Count of items the insert loop has committed so far.
///
/// Cloning yields another handle to the same value. Readers get whatever
/// value is current; nothing coordinates a read with a concurrent insert.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    value: Arc<AtomicU64>,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` and return the new value.
    pub fn increment(&self, by: u64) -> u64 {
        self.value.fetch_add(by, Ordering::SeqCst).saturating_add(by)
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
