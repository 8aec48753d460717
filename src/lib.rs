//! Sighting Kernel
//!
//! Temporal stabilization and artifact lifecycle for noisy per-frame object
//! detections (traffic signs seen from a moving vehicle).
//!
//! # Architecture
//!
//! A detector reports labels frame by frame and flickers: a sign seen for two
//! seconds may be missing from every fifth frame and hallucinated for a single
//! frame elsewhere. The kernel turns that stream into:
//!
//! 1. **Stable sightings**: a label is confirmed only after continuous presence
//!    for `stable_duration`, with gaps shorter than `buffer_timeout` tolerated.
//! 2. **A sighting history**: every confirmed label once, newest first.
//! 3. **Snapshots**: one immutable crop per sighting, taken at the moment of
//!    confirmation and shown after `capture_delay`.
//! 4. **Eviction**: a snapshot is dropped `display_duration` after the label was
//!    last confirmed.
//!
//! # Module Structure
//!
//! - `clock`: session time (wall or pause-aware)
//! - `frame`: frames, bounding boxes, snapshots
//! - `debounce`, `history`, `artifact`: per-label state machines
//! - `engine`: `StabilizationEngine`, the single owner of sighting state
//! - `detect`: detector backends and registry
//! - `ingest`: frame sources (synthetic scenes, image sequences)
//! - `handoff`, `session`: background frame pump and the consumer handoff
//! - `labels`, `config`: label catalog and daemon configuration

use std::time::Duration;

pub mod artifact;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod handoff;
pub mod history;
pub mod ingest;
pub mod labels;
pub mod session;

pub use artifact::{ArtifactCache, ArtifactCacheEntry, VisibleArtifact};
pub use clock::{ClockMode, SessionClock};
pub use debounce::DebounceWindow;
pub use detect::{BackendRegistry, Detection, DetectorBackend, SharedBackend};
pub use engine::{FrameResult, StabilizationEngine, StabilizerConfig, TaggedDetection};
pub use frame::{BoundingBox, Frame, Snapshot};
pub use handoff::LatestSlot;
pub use history::SightingHistory;
pub use ingest::{source_from_config, FrameSource, SourceConfig};
pub use labels::{LabelCatalog, SignKind};
pub use session::{
    SessionConfig, SessionController, SessionError, SessionHandle, SessionState, SessionUpdate,
};

/// `now - earlier`, saturating at zero.
///
/// Timestamps handed to the engine never go backwards, so a negative span only
/// shows up through a caller bug; debug builds catch it.
pub(crate) fn elapsed_between(now: Duration, earlier: Duration) -> Duration {
    debug_assert!(now >= earlier, "timestamp went backwards: {:?} < {:?}", now, earlier);
    now.saturating_sub(earlier)
}
