use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

/// One raw detector output for one frame.
///
/// Detections carry no timestamp of their own: they are observed at the session
/// time of the frame they were produced from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    /// Detector confidence, 0.0..=1.0.
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence,
        }
    }
}
