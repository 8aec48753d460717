//! Artifact cache.
//!
//! One entry per label whose sighting produced a snapshot. The snapshot and caption
//! are fixed when the entry is created; later confirmations only move
//! `last_seen_at`. Entries follow a two-phase timer:
//!
//! 1. hidden until `now - first_stable_at >= capture_delay`
//! 2. evicted once `now - last_seen_at > display_duration`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::elapsed_between;
use crate::frame::Snapshot;
use crate::labels::SignKind;

#[derive(Clone, Debug)]
pub struct ArtifactCacheEntry {
    pub label: String,
    snapshot: Arc<Snapshot>,
    caption: String,
    kind: SignKind,
    first_stable_at: Duration,
    last_seen_at: Duration,
}

impl ArtifactCacheEntry {
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn kind(&self) -> SignKind {
        self.kind
    }

    pub fn first_stable_at(&self) -> Duration {
        self.first_stable_at
    }

    pub fn last_seen_at(&self) -> Duration {
        self.last_seen_at
    }

    fn is_visible(&self, now: Duration, capture_delay: Duration) -> bool {
        elapsed_between(now, self.first_stable_at) >= capture_delay
    }

    fn is_expired(&self, now: Duration, display_duration: Duration) -> bool {
        elapsed_between(now, self.last_seen_at) > display_duration
    }
}

/// Read-only view of a visible entry handed to the presentation boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct VisibleArtifact {
    pub label: String,
    pub image: Arc<Snapshot>,
    pub caption: String,
    pub kind: SignKind,
    pub first_stable_at: Duration,
    pub last_seen_at: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ArtifactCache {
    entries: BTreeMap<String, ArtifactCacheEntry>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `label`. Refused (false) while an entry already exists.
    pub fn capture(
        &mut self,
        label: &str,
        snapshot: Snapshot,
        caption: String,
        kind: SignKind,
        now: Duration,
    ) -> bool {
        if self.entries.contains_key(label) {
            return false;
        }
        self.entries.insert(
            label.to_string(),
            ArtifactCacheEntry {
                label: label.to_string(),
                snapshot: Arc::new(snapshot),
                caption,
                kind,
                first_stable_at: now,
                last_seen_at: now,
            },
        );
        true
    }

    /// Refresh `last_seen_at`. Returns false when no entry exists.
    pub fn touch(&mut self, label: &str, now: Duration) -> bool {
        match self.entries.get_mut(label) {
            Some(entry) => {
                entry.last_seen_at = entry.last_seen_at.max(now);
                true
            }
            None => false,
        }
    }

    /// Remove entries not seen for longer than `display_duration`.
    pub fn evict_expired(&mut self, now: Duration, display_duration: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now, display_duration))
            .map(|entry| entry.label.clone())
            .collect();
        for label in &expired {
            self.entries.remove(label);
        }
        expired
    }

    /// Entries past their capture delay, newest stabilization first.
    pub fn visible(&self, now: Duration, capture_delay: Duration) -> Vec<VisibleArtifact> {
        let mut visible: Vec<VisibleArtifact> = self
            .entries
            .values()
            .filter(|entry| entry.is_visible(now, capture_delay))
            .map(|entry| VisibleArtifact {
                label: entry.label.clone(),
                image: Arc::clone(&entry.snapshot),
                caption: entry.caption.clone(),
                kind: entry.kind,
                first_stable_at: entry.first_stable_at,
                last_seen_at: entry.last_seen_at,
            })
            .collect();
        visible.sort_by(|a, b| {
            b.first_stable_at
                .cmp(&a.first_stable_at)
                .then_with(|| a.label.cmp(&b.label))
        });
        visible
    }

    pub fn get(&self, label: &str) -> Option<&ArtifactCacheEntry> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
