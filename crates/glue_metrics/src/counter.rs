//! Named counters for tracking conversions

use std::cell::RefCell;
use std::collections::HashMap;

/// Event counters keyed by static names.
///
/// Conversions run behind shared references, so counting goes through a
/// `RefCell`. The counter is `!Sync` like the engine context it observes.
pub struct Counter {
    counters: RefCell<HashMap<&'static str, u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: RefCell::new(HashMap::new()),
        }
    }

    pub fn increment(&self, name: &'static str, value: u64) {
        *self.counters.borrow_mut().entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.borrow().get(name).copied().unwrap_or(0)
    }

    pub fn reset(&self, name: &'static str) {
        self.counters.borrow_mut().insert(name, 0);
    }

    pub fn reset_all(&self) {
        self.counters.borrow_mut().clear();
    }

    /// Sorted copy of every counter, for logging.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<_> = self
            .counters
            .borrow()
            .iter()
            .map(|(name, value)| (*name, *value))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}
