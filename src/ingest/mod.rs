//! Frame ingestion sources.
//!
//! This module provides the sources a session can pull frames from:
//! - Synthetic scenes (`stub://name`), for demos and tests
//! - Local image-sequence directories (recorded footage exported frame by frame)
//!
//! Every source follows the same lifecycle: `open()` once, `next_frame()` until it
//! yields `None` (end of stream), then `close()`. Sources do not stamp session
//! time; the frame pump does that when a frame is pulled.

pub mod file;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::Frame;

pub use file::FileSource;
pub use synthetic::SyntheticSource;

/// Frame source collaborator.
pub trait FrameSource: Send {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device or file.
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device or file. Idempotent.
    fn close(&mut self);

    /// Playback interval for recorded sources; `None` pulls as fast as possible.
    fn pace(&self) -> Option<Duration> {
        None
    }
}

/// Configuration shared by all sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// `stub://name` or a local directory path.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Frame width (synthetic sources only).
    pub width: u32,
    /// Frame height (synthetic sources only).
    pub height: u32,
    /// Stop after this many frames.
    pub frame_limit: Option<u64>,
    /// Seed for synthetic scenes.
    pub seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://street".to_string(),
            target_fps: 10,
            width: 320,
            height: 240,
            frame_limit: None,
            seed: 7,
        }
    }
}

impl SourceConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    /// Media position of frame `index` at the target frame rate.
    pub fn position_of(&self, index: u64) -> Duration {
        Duration::from_secs_f64(index as f64 / f64::from(self.target_fps.max(1)))
    }
}

/// Build (but do not open) the source named by `config.url`.
pub fn source_from_config(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.target_fps == 0 {
        return Err(anyhow!("target fps must be >= 1"));
    }
    if config.url.starts_with("stub://") {
        Ok(Box::new(SyntheticSource::new(config.clone())))
    } else {
        Ok(Box::new(FileSource::new(config.clone())?))
    }
}
