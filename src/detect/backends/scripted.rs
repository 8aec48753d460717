//! Scripted backend.
//!
//! Replays a fixed cue sheet keyed by frame index. Used for tests and for replaying
//! annotations recorded from a real detector run. Script files are TOML:
//!
//! ```toml
//! fail_on = [12]
//!
//! [[cue]]
//! label = "P.102"
//! bbox = { x1 = 10.0, y1 = 10.0, x2 = 60.0, y2 = 60.0 }
//! confidence = 0.9
//! from_frame = 0
//! to_frame = 40
//! dropout = [5, 6]
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

#[derive(Clone, Debug, Deserialize)]
pub struct ScriptCue {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// First frame index (inclusive) on which the cue fires.
    #[serde(default)]
    pub from_frame: u64,
    /// Last frame index (exclusive). Open-ended when absent.
    #[serde(default)]
    pub to_frame: Option<u64>,
    /// Frames inside the range on which the cue is missed.
    #[serde(default)]
    pub dropout: Vec<u64>,
}

impl ScriptCue {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence,
            from_frame: 0,
            to_frame: None,
            dropout: Vec::new(),
        }
    }

    pub fn frames(mut self, from_frame: u64, to_frame: u64) -> Self {
        self.from_frame = from_frame;
        self.to_frame = Some(to_frame);
        self
    }

    pub fn with_dropout(mut self, dropout: Vec<u64>) -> Self {
        self.dropout = dropout;
        self
    }

    fn fires_on(&self, index: u64) -> bool {
        index >= self.from_frame
            && self.to_frame.map_or(true, |end| index < end)
            && !self.dropout.contains(&index)
    }
}

#[derive(Debug, Deserialize, Default)]
struct ScriptFile {
    #[serde(default)]
    fail_on: Vec<u64>,
    #[serde(default)]
    cue: Vec<ScriptCue>,
}

#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    cues: Vec<ScriptCue>,
    fail_on: Vec<u64>,
}

impl ScriptedBackend {
    pub fn new(cues: Vec<ScriptCue>) -> Self {
        Self {
            cues,
            fail_on: Vec::new(),
        }
    }

    /// Frame indices on which `detect` returns an error.
    pub fn with_failures(mut self, fail_on: Vec<u64>) -> Self {
        self.fail_on = fail_on;
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detector script {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid detector script {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ScriptFile = toml::from_str(raw)?;
        for cue in &file.cue {
            crate::labels::validate_label_id(&cue.label)?;
            if !(0.0..=1.0).contains(&cue.confidence) {
                return Err(anyhow!(
                    "cue '{}' confidence {} outside 0..=1",
                    cue.label,
                    cue.confidence
                ));
            }
        }
        Ok(Self {
            cues: file.cue,
            fail_on: file.fail_on,
        })
    }

    pub fn cue_count(&self) -> usize {
        self.cues.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if self.fail_on.contains(&frame.index) {
            return Err(anyhow!("scripted detector failure on frame {}", frame.index));
        }
        Ok(self
            .cues
            .iter()
            .filter(|cue| cue.fires_on(frame.index))
            .map(|cue| Detection::new(cue.label.clone(), cue.bbox, cue.confidence))
            .collect())
    }
}
