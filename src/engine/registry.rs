//! Dedup registry.
//!
//! Identifiers admitted during a run. Append-only: an asset that was
//! traded once is never re-entered, even after its position closes.

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: RwLock<HashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier. Returns `false` if it was already present.
    pub fn insert(&self, id: &str) -> bool {
        let mut seen = self.seen.write().unwrap_or_else(|e| e.into_inner());
        seen.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Copy of every identifier seen so far.
    pub fn snapshot(&self) -> HashSet<String> {
        self.seen.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
