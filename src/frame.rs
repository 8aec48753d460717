//! Frame and snapshot types.
//!
//! - `Frame`: one decoded RGB frame from a source. Shared read-only with the
//!   presentation boundary through `Arc<Frame>`.
//! - `BoundingBox`: detector-space rectangle (pixels, corner form).
//! - `Snapshot`: owned crop of a frame taken at the moment a sighting is confirmed.
//!
//! A `Snapshot` has no mutable accessors. Once it is wrapped in an `Arc` by the
//! artifact cache, neither the engine nor the presentation side can change it.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Axis-aligned box in the detector's pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// True when the box has no area or carries non-finite coordinates.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Integer pixel region clamped to a `width` x `height` frame.
    ///
    /// Returns `(x, y, w, h)` or `None` when nothing of the box lies inside.
    fn clamped_region(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.is_degenerate() {
            return None;
        }
        let x1 = self.x1.floor().clamp(0.0, width as f32) as u32;
        let y1 = self.y1.floor().clamp(0.0, height as f32) as u32;
        let x2 = self.x2.ceil().clamp(0.0, width as f32) as u32;
        let y2 = self.y2.ceil().clamp(0.0, height as f32) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Sequence number within the session, starting at 0.
    pub index: u64,
    /// Media position for recorded sources (file time), if known.
    pub position: Option<Duration>,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            position: None,
            image,
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer rejected for {}x{}", width, height))?;
        Ok(Self::new(index, image))
    }

    pub fn with_position(mut self, position: Duration) -> Self {
        self.position = Some(position);
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copy the region under `bbox` out of this frame.
    ///
    /// The box is clamped to the frame bounds. A degenerate box, or one lying
    /// entirely outside the frame, is a crop failure.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<Snapshot> {
        let (x, y, w, h) = bbox
            .clamped_region(self.width(), self.height())
            .ok_or_else(|| {
                anyhow!(
                    "crop region {:?} is empty inside {}x{} frame",
                    bbox,
                    self.width(),
                    self.height()
                )
            })?;
        let region = image::imageops::crop_imm(&self.image, x, y, w, h).to_image();
        Ok(Snapshot::new(region))
    }
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Immutable cropped image captured at a stabilization transition.
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    image: RgbImage,
    digest: [u8; 32],
}

impl Snapshot {
    pub fn new(image: RgbImage) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(image.as_raw());
        Self {
            image,
            digest: hasher.finalize().into(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// SHA-256 over dimensions and pixels.
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
