//! Sighting history: append-only ledger of labels that have become stable.
//!
//! Newest first. A label appears at most once per session; confirming it again
//! neither duplicates nor reorders it. Only a session reset clears the ledger.

use std::collections::{HashSet, VecDeque};

#[derive(Clone, Debug, Default)]
pub struct SightingHistory {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl SightingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `label` at the front. Returns false if it was already recorded.
    pub fn record(&mut self, label: &str) -> bool {
        if self.seen.contains(label) {
            return false;
        }
        self.seen.insert(label.to_string());
        self.order.push_front(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.seen.contains(label)
    }

    /// Labels, most recently confirmed first.
    pub fn labels(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    /// Labels in the order they were first confirmed, oldest first.
    pub fn chronological(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
