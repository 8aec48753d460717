//! Single-slot mailbox between the frame pump and the presentation consumer.
//!
//! The producer never blocks. A value the consumer has not taken yet is replaced
//! by the next one, so a slow consumer always sees the most recent state and
//! never accumulates a backlog. Values that are taken arrive in production order.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store `value`. Returns true if an unconsumed value was superseded.
    pub fn put(&self, value: T) -> bool {
        let mut guard = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let superseded = guard.replace(value).is_some();
        self.ready.notify_all();
        superseded
    }

    /// Take the pending value without waiting.
    pub fn take(&self) -> Option<T> {
        match self.value.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Wait up to `timeout` for a value.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(value) = guard.take() {
                return Some(value);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            guard = match self.ready.wait_timeout(guard, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Drop any pending value.
    pub fn clear(&self) {
        let _ = self.take();
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
