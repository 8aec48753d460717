//! Session controller and frame pump.
//!
//! One background worker per session pulls frames, runs the detector and feeds
//! the stabilization engine, strictly one frame at a time. The engine is moved
//! into the worker for the length of the session and handed back when the worker
//! exits, so no other thread can touch it while frames are flowing.
//!
//! State machine:
//!
//! ```text
//! Idle --start--> Running <--pause/resume--> Paused
//!  ^                 |                          |
//!  |                 +----stop / end of stream--+--> Stopped
//!  |                                                    |
//!  +------------------ worker exits --------------------+
//! ```
//!
//! `Stopped` only lasts while the worker winds down (for example while a slow
//! detector call finishes). Once the worker has closed the source and reset the
//! engine the state is `Idle` again, as seen from any `SessionHandle`.
//!
//! Results reach the consumer through a `LatestSlot`: a consumer that falls behind
//! skips to the newest result instead of queueing.

use anyhow::{anyhow, Result};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::clock::{ClockMode, SessionClock};
use crate::detect::{Detection, SharedBackend};
use crate::engine::{FrameResult, StabilizationEngine, StabilizerConfig};
use crate::frame::Frame;
use crate::handoff::LatestSlot;
use crate::ingest::FrameSource;
use crate::labels::LabelCatalog;

/// Reference detector threshold: weaker detections are never stabilized.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The frame source could not be opened. The controller stays idle.
    OpenFailed(String),
    /// `start` was called while a session is still active.
    AlreadyActive,
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::OpenFailed(reason) => write!(f, "failed to open frame source: {}", reason),
            SessionError::AlreadyActive => write!(f, "a session is already active"),
            SessionError::InvalidTransition { from, action } => {
                write!(f, "cannot {} a session in state {:?}", action, from)
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub stabilizer: StabilizerConfig,
    /// Detections below this confidence are dropped before stabilization.
    pub min_confidence: f32,
    pub clock: ClockMode,
    /// Honor the source's playback interval between frames.
    pub pace: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            clock: ClockMode::Wall,
            pace: true,
        }
    }
}

/// One processed frame, as delivered to the presentation boundary.
#[derive(Clone, Debug)]
pub struct SessionUpdate {
    pub frame: Arc<Frame>,
    pub result: FrameResult,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub detector_failures: u64,
    /// Results replaced before the consumer took them.
    pub superseded: u64,
}

// ----------------------------------------------------------------------------
// Shared control block
// ----------------------------------------------------------------------------

struct Control {
    state: SessionState,
    clock: SessionClock,
}

#[derive(Default)]
struct Counters {
    frames_processed: AtomicU64,
    detector_failures: AtomicU64,
    superseded: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.frames_processed.store(0, Ordering::SeqCst);
        self.detector_failures.store(0, Ordering::SeqCst);
        self.superseded.store(0, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_processed: self.frames_processed.load(Ordering::SeqCst),
            detector_failures: self.detector_failures.load(Ordering::SeqCst),
            superseded: self.superseded.load(Ordering::SeqCst),
        }
    }
}

struct Shared {
    control: Mutex<Control>,
    changed: Condvar,
    updates: LatestSlot<SessionUpdate>,
    counters: Counters,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn set_state(&self, state: SessionState) {
        self.lock().state = state;
        self.changed.notify_all();
    }

    fn now(&self) -> Duration {
        self.lock().clock.now()
    }

    fn request_stop(&self) {
        let mut control = self.lock();
        if control.state.is_active() {
            control.state = SessionState::Stopped;
        }
        drop(control);
        self.changed.notify_all();
    }

    /// Block while paused. Returns false once the session is no longer active.
    fn wait_until_running(&self) -> bool {
        let guard = self.lock();
        let guard = match self
            .changed
            .wait_while(guard, |control| control.state == SessionState::Paused)
        {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.state == SessionState::Running
    }

    /// Sleep for `interval`, waking early if the session stops.
    fn idle_for(&self, interval: Duration) {
        let guard = self.lock();
        let _ = self
            .changed
            .wait_timeout_while(guard, interval, |control| control.state.is_active());
    }

    /// Called by the worker once the source is closed and the engine reset.
    fn finish(&self) {
        self.set_state(SessionState::Idle);
    }
}

// ----------------------------------------------------------------------------
// SessionHandle: cross-thread stop + state
// ----------------------------------------------------------------------------

/// Cloneable handle usable from any thread (for example a Ctrl-C handler).
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Ask the worker to stop at its next suspension point.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }
}

// ----------------------------------------------------------------------------
// SessionController
// ----------------------------------------------------------------------------

pub struct SessionController {
    config: SessionConfig,
    catalog: Arc<LabelCatalog>,
    detector: SharedBackend,
    shared: Arc<Shared>,
    engine: Option<StabilizationEngine>,
    worker: Option<JoinHandle<StabilizationEngine>>,
}

impl SessionController {
    pub fn new(config: SessionConfig, catalog: Arc<LabelCatalog>, detector: SharedBackend) -> Self {
        let engine = StabilizationEngine::new(config.stabilizer, Arc::clone(&catalog));
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: SessionState::Idle,
                clock: SessionClock::start(config.clock),
            }),
            changed: Condvar::new(),
            updates: LatestSlot::new(),
            counters: Counters::default(),
        });
        Self {
            config,
            catalog,
            detector,
            shared,
            engine: Some(engine),
            worker: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current state. Reaps a worker that ended on its own.
    pub fn state(&mut self) -> SessionState {
        let state = self.shared.state();
        let finished = self.worker.as_ref().is_some_and(|w| w.is_finished());
        if finished || (self.worker.is_some() && state == SessionState::Idle) {
            self.reap();
        }
        self.shared.state()
    }

    /// Open `source`, reset the engine and start pumping frames.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(SessionError::AlreadyActive.into());
        }
        if state == SessionState::Stopped {
            log::debug!("waiting for the previous frame pump to exit");
            self.reap();
        }

        if let Err(err) = source.open() {
            log::warn!("session not started: {} failed to open: {:#}", source.describe(), err);
            return Err(SessionError::OpenFailed(format!("{}: {:#}", source.describe(), err)).into());
        }
        let source = OpenedSource(source);

        let mut engine = match self.engine.take() {
            Some(engine) => engine,
            None => self.fresh_engine(),
        };
        engine.reset();

        match self.detector.lock() {
            Ok(mut detector) => {
                if let Err(err) = detector.warm_up() {
                    log::warn!("detector {} warm-up failed: {:#}", detector.name(), err);
                }
            }
            Err(_) => log::warn!("detector lock poisoned; skipping warm-up"),
        }

        self.shared.updates.clear();
        self.shared.counters.reset();
        {
            let mut control = self.shared.lock();
            control.state = SessionState::Running;
            control.clock = SessionClock::start(self.config.clock);
        }
        log::info!("session started: {}", source.describe());

        let pump = Pump {
            shared: Arc::clone(&self.shared),
            detector: Arc::clone(&self.detector),
            config: self.config,
            source,
            engine,
        };
        let spawned = std::thread::Builder::new()
            .name("sighting-pump".to_string())
            .spawn(move || pump.run());
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(SessionState::Idle);
                self.engine = Some(self.fresh_engine());
                Err(anyhow!("failed to spawn frame pump: {}", err))
            }
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        let mut control = self.shared.lock();
        if control.state != SessionState::Running {
            return Err(SessionError::InvalidTransition {
                from: control.state,
                action: "pause",
            }
            .into());
        }
        control.state = SessionState::Paused;
        control.clock.pause();
        drop(control);
        self.shared.changed.notify_all();
        log::info!("session paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let mut control = self.shared.lock();
        if control.state != SessionState::Paused {
            return Err(SessionError::InvalidTransition {
                from: control.state,
                action: "resume",
            }
            .into());
        }
        control.state = SessionState::Running;
        control.clock.resume();
        drop(control);
        self.shared.changed.notify_all();
        log::info!("session resumed");
        Ok(())
    }

    /// Stop the session, wait for the worker and reset all sighting state.
    ///
    /// Stopping an idle controller is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.request_stop();
        self.reap();
        Ok(())
    }

    /// Wait up to `timeout` for the next processed frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SessionUpdate> {
        self.shared.updates.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<SessionUpdate> {
        self.shared.updates.take()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.counters.snapshot()
    }

    /// The engine, when no session is running.
    pub fn engine(&self) -> Option<&StabilizationEngine> {
        self.engine.as_ref()
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            let engine = match worker.join() {
                Ok(engine) => engine,
                Err(_) => {
                    log::error!("frame pump panicked; rebuilding engine");
                    self.fresh_engine()
                }
            };
            self.engine = Some(engine);
            log::info!("session stopped");
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
        self.shared.set_state(SessionState::Idle);
    }

    fn fresh_engine(&self) -> StabilizationEngine {
        StabilizationEngine::new(self.config.stabilizer, Arc::clone(&self.catalog))
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

// ----------------------------------------------------------------------------
// Pump: the worker body
// ----------------------------------------------------------------------------

/// A source that has been opened. Closed when dropped, whether or not the
/// worker ever ran.
struct OpenedSource(Box<dyn FrameSource>);

impl Deref for OpenedSource {
    type Target = dyn FrameSource;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for OpenedSource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for OpenedSource {
    fn drop(&mut self) {
        self.0.close();
    }
}

struct Pump {
    shared: Arc<Shared>,
    detector: SharedBackend,
    config: SessionConfig,
    source: OpenedSource,
    engine: StabilizationEngine,
}

impl Pump {
    fn run(mut self) -> StabilizationEngine {
        let pace = if self.config.pace {
            self.source.pace()
        } else {
            None
        };

        while self.shared.wait_until_running() {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("end of stream: {}", self.source.describe());
                    break;
                }
                Err(err) => {
                    log::warn!("frame source failed, ending stream: {:#}", err);
                    break;
                }
            };
            let now = self.shared.now();

            let detections = match self.detect(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    self.shared
                        .counters
                        .detector_failures
                        .fetch_add(1, Ordering::SeqCst);
                    log::warn!("detector failed on frame {}: {:#}", frame.index, err);
                    Vec::new()
                }
            };

            if !self.shared.state().is_active() {
                log::debug!("discarding detections for frame {} after stop", frame.index);
                break;
            }

            let result = self.engine.process(&frame, &detections, now);
            self.shared
                .counters
                .frames_processed
                .fetch_add(1, Ordering::SeqCst);
            let update = SessionUpdate {
                frame: Arc::new(frame),
                result,
            };
            if self.shared.updates.put(update) {
                self.shared.counters.superseded.fetch_add(1, Ordering::SeqCst);
            }

            if let Some(interval) = pace {
                self.shared.idle_for(interval);
            }
        }

        drop(self.source);
        self.engine.reset();
        self.shared.finish();
        self.engine
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        let mut detections = detector.detect(frame)?;
        detections.retain(|d| d.confidence >= self.config.min_confidence);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectorBackend, ScriptCue, ScriptedBackend};
    use crate::frame::BoundingBox;
    use crate::ingest::{SourceConfig, SyntheticSource};
    use std::sync::Mutex;

    fn controller(backend: ScriptedBackend) -> SessionController {
        let detector: SharedBackend = Arc::new(Mutex::new(backend));
        let config = SessionConfig {
            pace: false,
            ..SessionConfig::default()
        };
        SessionController::new(config, Arc::new(LabelCatalog::new()), detector)
    }

    fn source(frames: u64) -> Box<dyn FrameSource> {
        Box::new(SyntheticSource::new(SourceConfig {
            url: "stub://session-test".to_string(),
            width: 32,
            height: 32,
            frame_limit: Some(frames),
            ..SourceConfig::default()
        }))
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn describe(&self) -> String {
            "broken".to_string()
        }
        fn open(&mut self) -> Result<()> {
            Err(anyhow!("device busy"))
        }
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }
        fn close(&mut self) {}
    }

    fn wait_for_idle(controller: &mut SessionController) {
        for _ in 0..500 {
            if controller.state() == SessionState::Idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("session did not return to idle");
    }

    #[test]
    fn open_failure_leaves_controller_idle() {
        let mut controller = controller(ScriptedBackend::default());
        let err = controller.start(Box::new(BrokenSource)).unwrap_err();
        match err.downcast_ref::<SessionError>() {
            Some(SessionError::OpenFailed(reason)) => assert!(reason.contains("device busy")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.engine().is_some());
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let mut controller = controller(ScriptedBackend::default());
        let err = controller.pause().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::InvalidTransition { action: "pause", .. })
        ));
        assert!(controller.resume().is_err());
        assert!(controller.stop().is_ok());
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let backend = ScriptedBackend::new(vec![
            ScriptCue::new("P.102", BoundingBox::new(0.0, 0.0, 8.0, 8.0), 0.9),
            ScriptCue::new("W.201", BoundingBox::new(8.0, 8.0, 16.0, 16.0), 0.1),
        ]);
        let pump = Pump {
            shared: controller(ScriptedBackend::default()).shared.clone(),
            detector: Arc::new(Mutex::new(backend)),
            config: SessionConfig::default(),
            source: OpenedSource(source(1)),
            engine: StabilizationEngine::new(
                StabilizerConfig::default(),
                Arc::new(LabelCatalog::new()),
            ),
        };
        let frame = Frame::from_rgb(0, 16, 16, vec![0u8; 16 * 16 * 3]).unwrap();
        let detections = pump.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "P.102");
    }

    #[test]
    fn end_of_stream_returns_to_idle_and_resets() {
        let mut controller = controller(ScriptedBackend::new(vec![ScriptCue::new(
            "P.102",
            BoundingBox::new(0.0, 0.0, 8.0, 8.0),
            0.9,
        )]));
        controller.start(source(5)).unwrap();
        wait_for_idle(&mut controller);

        assert_eq!(controller.stats().frames_processed, 5);
        let engine = controller.engine().expect("engine handed back");
        assert!(engine.history().is_empty());
        assert_eq!(engine.artifact_count(), 0);
        let last = controller.try_recv().expect("last update kept for consumer");
        assert_eq!(last.result.frame_index, 4);
    }

    #[test]
    fn detector_failures_degrade_to_empty_frames() {
        let backend = ScriptedBackend::new(vec![ScriptCue::new(
            "P.102",
            BoundingBox::new(0.0, 0.0, 8.0, 8.0),
            0.9,
        )])
        .with_failures(vec![0, 1, 2]);
        let mut controller = controller(backend);
        controller.start(source(3)).unwrap();
        wait_for_idle(&mut controller);

        let stats = controller.stats();
        assert_eq!(stats.detector_failures, 3);
        assert_eq!(stats.frames_processed, 3);
        let last = controller.try_recv().expect("frames still delivered");
        assert!(last.result.pending.is_empty() && last.result.stable.is_empty());
    }

    #[test]
    fn start_while_running_is_rejected_and_stop_resets() {
        let mut controller = controller(ScriptedBackend::default());
        controller.start(source(u64::MAX)).unwrap();
        let err = controller.start(source(1)).unwrap_err();
        assert_eq!(err.downcast_ref::<SessionError>(), Some(&SessionError::AlreadyActive));

        controller.pause().unwrap();
        assert_eq!(controller.state(), SessionState::Paused);
        controller.resume().unwrap();

        let handle = controller.handle();
        std::thread::spawn(move || handle.request_stop())
            .join()
            .unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.engine().unwrap().history().is_empty());
    }

    struct TrackedSource {
        closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FrameSource for TrackedSource {
        fn describe(&self) -> String {
            "tracked".to_string()
        }
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }
        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn pump_that_never_runs_still_closes_its_source() {
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let pump = Pump {
            shared: controller(ScriptedBackend::default()).shared.clone(),
            detector: Arc::new(Mutex::new(ScriptedBackend::default())),
            config: SessionConfig::default(),
            source: OpenedSource(Box::new(TrackedSource {
                closed: Arc::clone(&closed),
            })),
            engine: StabilizationEngine::new(
                StabilizerConfig::default(),
                Arc::new(LabelCatalog::new()),
            ),
        };
        drop(pump);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn end_of_stream_closes_source_and_reports_idle_to_handles() {
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut controller = controller(ScriptedBackend::default());
        let handle = controller.handle();
        controller
            .start(Box::new(TrackedSource {
                closed: Arc::clone(&closed),
            }))
            .unwrap();

        for _ in 0..500 {
            if handle.state() == SessionState::Idle {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.state(), SessionState::Idle);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.engine().is_some());
    }

    #[test]
    fn scripted_backend_is_object_safe() {
        let backend: Box<dyn DetectorBackend> = Box::new(ScriptedBackend::default());
        assert_eq!(backend.name(), "scripted");
    }
}
