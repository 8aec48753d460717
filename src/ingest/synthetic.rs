//! Synthetic frame source (`stub://`).
//!
//! Generates a grey street scene with coloured square "signs" drifting across it.
//! Each sign is present for a fixed range of frames and is randomly left out of
//! some frames, which exercises the debounce logic the way a flickering detector
//! would. The scene is fully determined by the configured seed.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::{FrameSource, SourceConfig};
use crate::frame::Frame;

const BACKGROUND: [u8; 3] = [90, 90, 90];
const FLICKER_PROBABILITY: f64 = 0.1;

#[derive(Clone, Debug)]
struct Actor {
    color: [u8; 3],
    size: u32,
    start_frame: u64,
    end_frame: u64,
    origin: (f32, f32),
    velocity: (f32, f32),
}

impl Actor {
    fn position(&self, frame: u64) -> (i64, i64) {
        let t = frame.saturating_sub(self.start_frame) as f32;
        (
            (self.origin.0 + self.velocity.0 * t) as i64,
            (self.origin.1 + self.velocity.1 * t) as i64,
        )
    }
}

pub struct SyntheticSource {
    config: SourceConfig,
    actors: Vec<Actor>,
    rng: StdRng,
    frame_count: u64,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        let actors = default_scene(&config);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            actors,
            rng,
            frame_count: 0,
            opened: false,
        }
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self, index: u64) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_pixel(width, height, Rgb(BACKGROUND));
        for actor in &self.actors {
            if index < actor.start_frame || index >= actor.end_frame {
                continue;
            }
            if self.rng.gen_bool(FLICKER_PROBABILITY) {
                continue;
            }
            let (ax, ay) = actor.position(index);
            for y in ay.max(0)..(ay + actor.size as i64).min(height as i64) {
                for x in ax.max(0)..(ax + actor.size as i64).min(width as i64) {
                    image.put_pixel(x as u32, y as u32, Rgb(actor.color));
                }
            }
        }
        image
    }
}

/// Three signs entering one after another: red, blue, then yellow.
fn default_scene(config: &SourceConfig) -> Vec<Actor> {
    let fps = config.target_fps.max(1) as u64;
    let size = (config.width.min(config.height) / 6).max(4);
    let colors = [[230, 30, 30], [30, 60, 230], [240, 210, 40]];
    colors
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let i = i as u64;
            Actor {
                color: *color,
                size,
                start_frame: i * 3 * fps,
                end_frame: i * 3 * fps + 4 * fps,
                origin: (
                    (config.width / 8) as f32 + i as f32 * size as f32 * 1.5,
                    (config.height / 4) as f32,
                ),
                velocity: (0.5, 0.2),
            }
        })
        .collect()
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "{} (synthetic {}x{} @ {} fps)",
            self.config.url, self.config.width, self.config.height, self.config.target_fps
        )
    }

    fn open(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        self.opened = true;
        log::info!("SyntheticSource: opened {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Err(anyhow!("synthetic source {} is not open", self.config.url));
        }
        if self
            .config
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let index = self.frame_count;
        self.frame_count += 1;
        let image = self.render(index);
        let position = self.config.position_of(index);
        Ok(Some(Frame::new(index, image).with_position(position)))
    }

    fn close(&mut self) {
        if self.opened {
            log::info!(
                "SyntheticSource: closed {} after {} frames",
                self.config.url,
                self.frame_count
            );
        }
        self.opened = false;
    }

    fn pace(&self) -> Option<Duration> {
        Some(self.config.frame_interval())
    }
}
