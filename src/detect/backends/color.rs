use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

/// Colour family a rule thresholds on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hue {
    Red,
    Blue,
    Yellow,
}

impl Hue {
    fn matches(&self, [r, g, b]: [u8; 3]) -> bool {
        let (r, g, b) = (r as i16, g as i16, b as i16);
        match self {
            Hue::Red => r > 150 && r - g > 80 && r - b > 80,
            Hue::Blue => b > 150 && b - r > 80 && b - g > 40,
            Hue::Yellow => r > 180 && g > 150 && r - b > 100 && g - b > 80,
        }
    }
}

/// Maps one colour family to the label reported for it.
#[derive(Clone, Debug)]
pub struct ColorRule {
    pub hue: Hue,
    pub label: String,
}

impl ColorRule {
    pub fn new(hue: Hue, label: impl Into<String>) -> Self {
        Self {
            hue,
            label: label.into(),
        }
    }
}

/// CPU backend that finds saturated sign colours.
///
/// Each rule yields at most one detection: the bounding box of all matching
/// pixels. Confidence is the fraction of that box covered by matching pixels.
pub struct ColorBackend {
    rules: Vec<ColorRule>,
    min_pixels: u32,
}

impl ColorBackend {
    pub fn new(rules: Vec<ColorRule>, min_pixels: u32) -> Self {
        Self { rules, min_pixels }
    }
}

impl Default for ColorBackend {
    fn default() -> Self {
        Self::new(
            vec![
                ColorRule::new(Hue::Red, "P.101"),
                ColorRule::new(Hue::Blue, "R.301"),
                ColorRule::new(Hue::Yellow, "W.201"),
            ],
            16,
        )
    }
}

#[derive(Default)]
struct Extent {
    count: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Extent {
    fn add(&mut self, x: u32, y: u32) {
        if self.count == 0 {
            (self.min_x, self.min_y, self.max_x, self.max_y) = (x, y, x, y);
        } else {
            self.min_x = self.min_x.min(x);
            self.min_y = self.min_y.min(y);
            self.max_x = self.max_x.max(x);
            self.max_y = self.max_y.max(y);
        }
        self.count += 1;
    }

    fn area(&self) -> u32 {
        (self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)
    }
}

impl DetectorBackend for ColorBackend {
    fn name(&self) -> &'static str {
        "color"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut extents: Vec<Extent> = self.rules.iter().map(|_| Extent::default()).collect();
        for (x, y, pixel) in frame.image().enumerate_pixels() {
            for (rule, extent) in self.rules.iter().zip(extents.iter_mut()) {
                if rule.hue.matches(pixel.0) {
                    extent.add(x, y);
                }
            }
        }

        Ok(self
            .rules
            .iter()
            .zip(extents)
            .filter(|(_, extent)| extent.count >= self.min_pixels)
            .map(|(rule, extent)| {
                let bbox = BoundingBox::new(
                    extent.min_x as f32,
                    extent.min_y as f32,
                    (extent.max_x + 1) as f32,
                    (extent.max_y + 1) as f32,
                );
                let confidence = extent.count as f32 / extent.area() as f32;
                Detection::new(rule.label.clone(), bbox, confidence)
            })
            .collect())
    }
}
