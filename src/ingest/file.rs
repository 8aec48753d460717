//! Local image-sequence source.
//!
//! This module provides `FileSource` for replaying recorded footage that has been
//! exported as a directory of still images (`.png`, `.jpg`, `.jpeg`). Frames are
//! played in file-name order at the configured frame rate.
//!
//! The file source MUST NOT fetch remote URLs.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{FrameSource, SourceConfig};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct FileSource {
    config: SourceConfig,
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl FileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !is_local_file_path(&config.url) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let root = PathBuf::from(&config.url);
        Ok(Self {
            config,
            root,
            files: Vec::new(),
            cursor: 0,
        })
    }

    /// Number of frames found when the source was opened.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("{} (image sequence @ {} fps)", self.root.display(), self.config.target_fps)
    }

    fn open(&mut self) -> Result<()> {
        let files = list_images(&self.root)?;
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.root.display()));
        }
        log::info!(
            "FileSource: opened {} ({} frames)",
            self.root.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let limit_reached = self
            .config
            .frame_limit
            .is_some_and(|limit| self.cursor as u64 >= limit);
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        if limit_reached {
            return Ok(None);
        }
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let index = self.cursor as u64;
        self.cursor += 1;
        let position = self.config.position_of(index);
        Ok(Some(Frame::new(index, image).with_position(position)))
    }

    fn close(&mut self) {
        if !self.files.is_empty() {
            log::info!(
                "FileSource: closed {} at frame {}/{}",
                self.root.display(),
                self.cursor,
                self.files.len()
            );
        }
        self.files.clear();
        self.cursor = 0;
    }

    fn pace(&self) -> Option<Duration> {
        Some(self.config.frame_interval())
    }
}

fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to open image directory {}", root.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}
