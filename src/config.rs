use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::ClockMode;
use crate::engine::StabilizerConfig;
use crate::ingest::SourceConfig;
use crate::session::{SessionConfig, DEFAULT_MIN_CONFIDENCE};

const DEFAULT_DETECTOR: &str = "color";
const KNOWN_DETECTORS: &[&str] = &["color", "scripted"];

#[derive(Debug, Deserialize, Default)]
struct SightingdConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    stabilizer: Option<StabilizerConfigFile>,
    clock: Option<ClockMode>,
    pace: Option<bool>,
    labels_path: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    script_path: Option<PathBuf>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct StabilizerConfigFile {
    stable_ms: Option<u64>,
    buffer_timeout_ms: Option<u64>,
    capture_delay_ms: Option<u64>,
    display_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SightingdConfig {
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub session: SessionConfig,
    pub labels_path: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registered backend name used as the default detector.
    pub backend: String,
    /// TOML cue script for the `scripted` backend.
    pub script_path: Option<PathBuf>,
}

impl SightingdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SightingdConfigFile) -> Self {
        let defaults = SourceConfig::default();
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file.url.unwrap_or(defaults.url),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            frame_limit: source_file.frame_limit.or(defaults.frame_limit),
            seed: source_file.seed.unwrap_or(defaults.seed),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            script_path: detector_file.script_path,
        };

        let base = StabilizerConfig::default();
        let stabilizer_file = file.stabilizer.unwrap_or_default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let stabilizer = StabilizerConfig {
            stable_duration: millis(stabilizer_file.stable_ms, base.stable_duration),
            buffer_timeout: millis(stabilizer_file.buffer_timeout_ms, base.buffer_timeout),
            capture_delay: millis(stabilizer_file.capture_delay_ms, base.capture_delay),
            display_duration: millis(stabilizer_file.display_ms, base.display_duration),
        };

        let session = SessionConfig {
            stabilizer,
            min_confidence: detector_file
                .min_confidence
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            clock: file.clock.unwrap_or_default(),
            pace: file.pace.unwrap_or(true),
        };

        Self {
            source,
            detector,
            session,
            labels_path: file.labels_path,
            snapshot_dir: file.snapshot_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SIGHTING_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("SIGHTING_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var("SIGHTING_MIN_CONFIDENCE") {
            self.session.min_confidence = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTING_MIN_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(mode) = std::env::var("SIGHTING_CLOCK") {
            self.session.clock = ClockMode::parse(&mode)?;
        }
        if let Ok(path) = std::env::var("SIGHTING_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(dir) = std::env::var("SIGHTING_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        self.detector.backend = self.detector.backend.to_lowercase();
        if !KNOWN_DETECTORS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of: {})",
                self.detector.backend,
                KNOWN_DETECTORS.join(", ")
            ));
        }
        let confidence = self.session.min_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "min_confidence must be within [0, 1], got {}",
                confidence
            ));
        }
        self.session.stabilizer.validate()?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SightingdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let mut cfg = SightingdConfig::from_file(SightingdConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.source, SourceConfig::default());
        assert_eq!(cfg.detector.backend, "color");
        assert_eq!(cfg.session.stabilizer, StabilizerConfig::default());
        assert_eq!(cfg.session.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(cfg.session.clock, ClockMode::Wall);
    }

    #[test]
    fn parses_partial_json() {
        let file: SightingdConfigFile = serde_json::from_str(
            r#"{ "stabilizer": { "stable_ms": 250 }, "clock": "session" }"#,
        )
        .unwrap();
        let cfg = SightingdConfig::from_file(file);
        assert_eq!(cfg.session.stabilizer.stable_duration, Duration::from_millis(250));
        assert_eq!(
            cfg.session.stabilizer.display_duration,
            StabilizerConfig::default().display_duration
        );
        assert_eq!(cfg.session.clock, ClockMode::Session);
    }

    #[test]
    fn rejects_unknown_backend_and_zero_timeout() {
        let mut cfg = SightingdConfig::from_file(SightingdConfigFile::default());
        cfg.detector.backend = "yolo".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SightingdConfig::from_file(SightingdConfigFile::default());
        cfg.session.stabilizer.buffer_timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }
}
