//! Session clock.
//!
//! Every timestamp handed to the stabilization engine is a `Duration` offset from
//! the session origin. How a pause affects that offset is a policy choice:
//!
//! - `ClockMode::Wall`: time keeps running while the session is paused. Debounce
//!   windows can go cold and artifacts can evict purely because of the pause.
//! - `ClockMode::Session`: time freezes between `pause()` and `resume()`. The
//!   engine sees a gap-free timeline across the pause.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    #[default]
    Wall,
    Session,
}

impl ClockMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wall" => Ok(ClockMode::Wall),
            "session" => Ok(ClockMode::Session),
            other => Err(anyhow!(
                "unknown clock mode '{}' (expected 'wall' or 'session')",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionClock {
    mode: ClockMode,
    origin: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl SessionClock {
    pub fn start(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Current session time.
    pub fn now(&self) -> Duration {
        self.at(Instant::now())
    }

    fn at(&self, instant: Instant) -> Duration {
        let raw = instant.saturating_duration_since(self.origin);
        match self.mode {
            ClockMode::Wall => raw,
            ClockMode::Session => {
                let frozen = self
                    .paused_at
                    .map(|since| instant.saturating_duration_since(since))
                    .unwrap_or_default();
                raw.saturating_sub(self.paused_total + frozen)
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(since) = self.paused_at.take() {
            self.paused_total += since.elapsed();
        }
    }
}
