//! Sync loop generations.
//!
//! Every sync loop captures a generation when it starts. Starting another
//! loop or stopping advances the live generation; a loop that finds its
//! captured value is no longer live must exit without touching state.

use std::sync::{Mutex, PoisonError};

/// The live sync generation, guarded by a single mutex.
#[derive(Debug, Default)]
pub struct SyncGeneration {
    current: Mutex<u64>,
}

impl SyncGeneration {
    /// Create a counter at generation zero (no loop issued yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new generation, strictly greater than every previous one.
    ///
    /// Any loop holding an older generation is superseded.
    pub fn advance(&self) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        *current
    }

    /// The live generation.
    pub fn current(&self) -> u64 {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if `generation` is still the live one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
