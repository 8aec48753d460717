//! Stabilization engine.
//!
//! The single owner of all per-session sighting state:
//!
//! - one `DebounceWindow` per label seen recently
//! - the `SightingHistory`
//! - the `ArtifactCache`
//!
//! All mutation goes through `process` (once per frame, in frame order) and
//! `reset`. `process` never blocks and never performs I/O beyond logging.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::{ArtifactCache, ArtifactCacheEntry, VisibleArtifact};
use crate::debounce::DebounceWindow;
use crate::detect::Detection;
use crate::frame::Frame;
use crate::history::SightingHistory;
use crate::labels::{LabelCatalog, SignKind};

pub const DEFAULT_STABLE_DURATION: Duration = Duration::from_millis(500);
pub const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_CAPTURE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StabilizerConfig {
    /// Minimum presence span before a label is confirmed.
    pub stable_duration: Duration,
    /// Longest tolerated gap between observations.
    pub buffer_timeout: Duration,
    /// Delay after confirmation before the artifact is shown.
    pub capture_delay: Duration,
    /// Time since last confirmation after which the artifact is evicted.
    pub display_duration: Duration,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            stable_duration: DEFAULT_STABLE_DURATION,
            buffer_timeout: DEFAULT_BUFFER_TIMEOUT,
            capture_delay: DEFAULT_CAPTURE_DELAY,
            display_duration: DEFAULT_DISPLAY_DURATION,
        }
    }
}

impl StabilizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_timeout.is_zero() {
            return Err(anyhow!("buffer timeout must be greater than zero"));
        }
        if self.display_duration.is_zero() {
            return Err(anyhow!("display duration must be greater than zero"));
        }
        Ok(())
    }
}

/// A detection from the current frame, annotated for presentation.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedDetection {
    pub detection: Detection,
    pub caption: String,
    pub kind: SignKind,
}

/// Everything the presentation boundary needs for one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameResult {
    pub frame_index: u64,
    pub at: Duration,
    /// Detections whose label is currently stable, in detector order.
    pub stable: Vec<TaggedDetection>,
    /// Detections still inside their debounce period, in detector order.
    pub pending: Vec<TaggedDetection>,
    /// Confirmed labels, newest first.
    pub history: Vec<String>,
    pub visible_artifacts: Vec<VisibleArtifact>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames: u64,
    pub sightings: u64,
    pub crop_failures: u64,
    pub evictions: u64,
}

pub struct StabilizationEngine {
    config: StabilizerConfig,
    catalog: Arc<LabelCatalog>,
    windows: BTreeMap<String, DebounceWindow>,
    history: SightingHistory,
    artifacts: ArtifactCache,
    last_now: Option<Duration>,
    stats: EngineStats,
}

impl StabilizationEngine {
    pub fn new(config: StabilizerConfig, catalog: Arc<LabelCatalog>) -> Self {
        Self {
            config,
            catalog,
            windows: BTreeMap::new(),
            history: SightingHistory::new(),
            artifacts: ArtifactCache::new(),
            last_now: None,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Fold one frame's detections into the session state.
    pub fn process(&mut self, frame: &Frame, detections: &[Detection], now: Duration) -> FrameResult {
        let now = self.monotonic(now);
        self.stats.frames += 1;

        for detection in detections {
            self.windows
                .entry(detection.label.clone())
                .or_default()
                .record(now);
        }

        let mut stable = Vec::new();
        let mut pending = Vec::new();
        for detection in detections {
            let is_stable = self
                .windows
                .get_mut(&detection.label)
                .map(|window| {
                    window.is_stable(
                        now,
                        self.config.stable_duration,
                        self.config.buffer_timeout,
                    )
                })
                .unwrap_or(false);

            let tagged = TaggedDetection {
                detection: detection.clone(),
                caption: self.catalog.caption(&detection.label),
                kind: SignKind::from_label(&detection.label),
            };

            if !is_stable {
                pending.push(tagged);
                continue;
            }

            if self.history.record(&detection.label) {
                self.confirm(frame, &tagged, now);
            } else {
                self.artifacts.touch(&detection.label, now);
            }
            stable.push(tagged);
        }

        self.sweep(now);

        FrameResult {
            frame_index: frame.index,
            at: now,
            stable,
            pending,
            history: self.history.labels(),
            visible_artifacts: self.artifacts.visible(now, self.config.capture_delay),
        }
    }

    /// Clear windows, history and artifacts together.
    pub fn reset(&mut self) {
        self.windows.clear();
        self.history.clear();
        self.artifacts.clear();
        self.last_now = None;
    }

    pub fn history(&self) -> &SightingHistory {
        &self.history
    }

    pub fn artifact(&self, label: &str) -> Option<&ArtifactCacheEntry> {
        self.artifacts.get(label)
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Labels that currently hold a non-empty debounce window.
    pub fn tracked_labels(&self) -> Vec<String> {
        self.windows.keys().cloned().collect()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn confirm(&mut self, frame: &Frame, tagged: &TaggedDetection, now: Duration) {
        let label = &tagged.detection.label;
        self.stats.sightings += 1;
        log::info!("sighting confirmed: {} ({})", label, tagged.caption);

        match frame.crop(&tagged.detection.bbox) {
            Ok(snapshot) => {
                self.artifacts
                    .capture(label, snapshot, tagged.caption.clone(), tagged.kind, now);
            }
            Err(err) => {
                self.stats.crop_failures += 1;
                log::warn!("no snapshot for {} on frame {}: {}", label, frame.index, err);
            }
        }
    }

    fn sweep(&mut self, now: Duration) {
        let buffer_timeout = self.config.buffer_timeout;
        self.windows.retain(|_, window| {
            window.prune(now, buffer_timeout);
            !window.is_empty()
        });

        for label in self
            .artifacts
            .evict_expired(now, self.config.display_duration)
        {
            self.stats.evictions += 1;
            log::debug!("artifact evicted: {}", label);
        }
    }

    /// Clamp a regressing clock to the last processed time.
    fn monotonic(&mut self, now: Duration) -> Duration {
        let now = match self.last_now {
            Some(last) if now < last => {
                debug_assert!(false, "clock regressed from {:?} to {:?}", last, now);
                log::warn!("clock regressed from {:?} to {:?}; clamping", last, now);
                last
            }
            _ => now,
        };
        self.last_now = Some(now);
        now
    }
}
