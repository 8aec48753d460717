//! Per-label debounce window.
//!
//! A window is the rolling record of the times one label was observed. A label is
//! stable once the span from the earliest retained observation reaches
//! `stable_duration`. Observations older than `buffer_timeout` are pruned on every
//! check, so a gap of at least `buffer_timeout` empties the window and the next
//! observation starts a fresh span. Shorter gaps are tolerated and the span keeps
//! accumulating across them.

use std::collections::VecDeque;
use std::time::Duration;

use crate::elapsed_between;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebounceWindow {
    stamps: VecDeque<Duration>,
}

impl DebounceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation.
    ///
    /// Stamps stay non-decreasing: an earlier stamp is clamped to the latest one.
    /// Recording the latest stamp again is a no-op.
    pub fn record(&mut self, at: Duration) {
        match self.stamps.back() {
            Some(&last) if at <= last => {
                debug_assert!(at == last, "observation {:?} precedes {:?}", at, last);
            }
            _ => self.stamps.push_back(at),
        }
    }

    /// Drop every stamp with `now - t >= buffer_timeout`.
    pub fn prune(&mut self, now: Duration, buffer_timeout: Duration) {
        while let Some(&oldest) = self.stamps.front() {
            if elapsed_between(now, oldest) >= buffer_timeout {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, then report whether the retained span reaches `stable_duration`.
    pub fn is_stable(
        &mut self,
        now: Duration,
        stable_duration: Duration,
        buffer_timeout: Duration,
    ) -> bool {
        self.prune(now, buffer_timeout);
        match self.stamps.front() {
            Some(&earliest) => elapsed_between(now, earliest) >= stable_duration,
            None => false,
        }
    }

    pub fn earliest(&self) -> Option<Duration> {
        self.stamps.front().copied()
    }

    pub fn latest(&self) -> Option<Duration> {
        self.stamps.back().copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
