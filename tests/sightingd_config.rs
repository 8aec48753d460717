use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use sighting_kernel::config::SightingdConfig;
use sighting_kernel::ClockMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGHTING_CONFIG",
        "SIGHTING_SOURCE_URL",
        "SIGHTING_DETECTOR",
        "SIGHTING_MIN_CONFIDENCE",
        "SIGHTING_CLOCK",
        "SIGHTING_LABELS_PATH",
        "SIGHTING_SNAPSHOT_DIR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "source": {
                "url": "/var/lib/sightings/clip07",
                "target_fps": 25,
                "frame_limit": 500
            },
            "detector": {
                "backend": "scripted",
                "script_path": "/etc/sighting/cues.toml",
                "min_confidence": 0.4
            },
            "stabilizer": {
                "stable_ms": 300,
                "buffer_timeout_ms": 1500,
                "capture_delay_ms": 1000,
                "display_ms": 3000
            },
            "clock": "wall",
            "labels_path": "/etc/sighting/labels.toml"
        }"#,
    );

    std::env::set_var("SIGHTING_CONFIG", file.path());
    std::env::set_var("SIGHTING_CLOCK", "session");
    std::env::set_var("SIGHTING_SNAPSHOT_DIR", "/tmp/sightings");
    std::env::set_var("SIGHTING_MIN_CONFIDENCE", "0.6");

    let cfg = SightingdConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "/var/lib/sightings/clip07");
    assert_eq!(cfg.source.target_fps, 25);
    assert_eq!(cfg.source.frame_limit, Some(500));
    assert_eq!(cfg.source.width, 320);
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(
        cfg.detector.script_path,
        Some(PathBuf::from("/etc/sighting/cues.toml"))
    );
    assert_eq!(cfg.session.min_confidence, 0.6);
    assert_eq!(cfg.session.clock, ClockMode::Session);
    assert_eq!(cfg.session.stabilizer.stable_duration, Duration::from_millis(300));
    assert_eq!(cfg.session.stabilizer.buffer_timeout, Duration::from_millis(1500));
    assert_eq!(cfg.session.stabilizer.capture_delay, Duration::from_secs(1));
    assert_eq!(cfg.session.stabilizer.display_duration, Duration::from_secs(3));
    assert_eq!(
        cfg.labels_path,
        Some(PathBuf::from("/etc/sighting/labels.toml"))
    );
    assert_eq!(cfg.snapshot_dir, Some(PathBuf::from("/tmp/sightings")));

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTING_SOURCE_URL", "stub://highway");
    std::env::set_var("SIGHTING_DETECTOR", "Scripted");

    let cfg = SightingdConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://highway");
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.session.min_confidence, 0.25);
    assert_eq!(cfg.session.clock, ClockMode::Wall);
    assert_eq!(cfg.session.stabilizer.stable_duration, Duration::from_millis(500));
    assert!(cfg.snapshot_dir.is_none());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTING_MIN_CONFIDENCE", "1.5");
    assert!(SightingdConfig::load().is_err());
    clear_env();

    std::env::set_var("SIGHTING_CLOCK", "sundial");
    assert!(SightingdConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "stabilizer": { "display_ms": 0 } }"#);
    std::env::set_var("SIGHTING_CONFIG", file.path());
    assert!(SightingdConfig::load().is_err());
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("SIGHTING_CONFIG", file.path());
    assert!(SightingdConfig::load().is_err());

    clear_env();
}
