use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};

use sighting_kernel::{
    BoundingBox, Detection, Frame, LabelCatalog, SignKind, StabilizationEngine, StabilizerConfig,
};

fn secs(v: f64) -> Duration {
    Duration::from_secs_f64(v)
}

fn frame(index: u64) -> Frame {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([90, 90, 90]));
    for y in 8..24 {
        for x in 8..24 {
            image.put_pixel(x, y, Rgb([230, 30, 30]));
        }
    }
    Frame::new(index, image)
}

fn sign(label: &str) -> Detection {
    Detection::new(label, BoundingBox::new(8.0, 8.0, 24.0, 24.0), 0.9)
}

fn engine(config: StabilizerConfig) -> StabilizationEngine {
    let catalog = LabelCatalog::from_toml_str(
        r#"
        [labels]
        "P.102" = "No entry"
        "W.201" = "Dangerous bend"
        "#,
    )
    .expect("catalog");
    StabilizationEngine::new(config, Arc::new(catalog))
}

/// Confirmation and visibility on the first stable frame.
fn immediate() -> StabilizerConfig {
    StabilizerConfig {
        stable_duration: Duration::ZERO,
        capture_delay: Duration::ZERO,
        ..StabilizerConfig::default()
    }
}

#[test]
fn label_is_pending_until_stable_duration() {
    let mut engine = engine(StabilizerConfig::default());
    for (i, t) in [0.0, 0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
        let result = engine.process(&frame(i as u64), &[sign("P.102")], secs(t));
        assert!(result.stable.is_empty(), "stable too early at {t}s");
        assert_eq!(result.pending.len(), 1);
        assert!(result.history.is_empty());
    }
    let result = engine.process(&frame(5), &[sign("P.102")], secs(0.5));
    assert_eq!(result.stable.len(), 1);
    assert_eq!(result.stable[0].caption, "No entry");
    assert_eq!(result.stable[0].kind, SignKind::Prohibitory);
    assert_eq!(result.history, vec!["P.102".to_string()]);
}

#[test]
fn single_frame_hallucination_never_becomes_a_sighting() {
    let mut engine = engine(StabilizerConfig::default());
    engine.process(&frame(0), &[sign("W.201")], secs(0.0));
    for i in 1..40 {
        let result = engine.process(&frame(i), &[], secs(i as f64 * 0.1));
        assert!(result.history.is_empty());
    }
    assert!(engine.tracked_labels().is_empty());
    assert_eq!(engine.artifact_count(), 0);
}

#[test]
fn snapshot_is_captured_exactly_once() {
    let mut engine = engine(StabilizerConfig::default());
    for i in 0..5 {
        engine.process(&frame(i), &[sign("P.102")], secs(i as f64 * 0.1));
    }

    let mut first = None;
    let mut last_seen = Vec::new();
    for i in 5..15 {
        let result = engine.process(&frame(i), &[sign("P.102")], secs(i as f64 * 0.1));
        assert_eq!(result.stable.len(), 1);
        let entry = engine.artifact("P.102").expect("artifact captured");
        let snapshot = Arc::clone(entry.snapshot());
        match &first {
            None => first = Some(snapshot),
            Some(original) => assert!(Arc::ptr_eq(original, &snapshot)),
        }
        assert_eq!(entry.first_stable_at(), secs(0.5));
        last_seen.push(entry.last_seen_at());
    }
    assert_eq!(engine.stats().sightings, 1);
    assert!(last_seen.windows(2).all(|w| w[0] < w[1]));
    let snapshot = first.expect("snapshot");
    assert_eq!((snapshot.width(), snapshot.height()), (16, 16));
}

#[test]
fn history_keeps_first_confirmation_order() {
    let config = StabilizerConfig {
        stable_duration: Duration::ZERO,
        capture_delay: Duration::ZERO,
        display_duration: secs(2.0),
        ..StabilizerConfig::default()
    };
    let mut engine = engine(config);
    engine.process(&frame(0), &[sign("A")], secs(1.0));
    engine.process(&frame(1), &[sign("B")], secs(2.0));
    // A has not been seen since t=1 and is evicted.
    engine.process(&frame(2), &[sign("B")], secs(3.5));
    assert!(engine.artifact("A").is_none());

    let result = engine.process(&frame(3), &[sign("A")], secs(5.0));
    assert_eq!(result.stable.len(), 1);
    assert_eq!(result.history, vec!["B".to_string(), "A".to_string()]);
    assert_eq!(
        engine.history().chronological(),
        vec!["A".to_string(), "B".to_string()]
    );
    // Re-stabilizing an already recorded label does not capture again.
    assert!(engine.artifact("A").is_none());
}

#[test]
fn artifact_visibility_and_eviction_follow_timers() {
    let config = StabilizerConfig {
        stable_duration: Duration::ZERO,
        capture_delay: secs(2.0),
        display_duration: secs(2.0),
        ..StabilizerConfig::default()
    };
    let mut engine = engine(config);
    engine.process(&frame(0), &[sign("P.102")], secs(0.0));

    let result = engine.process(&frame(1), &[], secs(1.9));
    assert!(result.visible_artifacts.is_empty());

    let result = engine.process(&frame(2), &[sign("P.102")], secs(2.0));
    assert_eq!(result.visible_artifacts.len(), 1);
    assert_eq!(result.visible_artifacts[0].caption, "No entry");
    assert_eq!(result.visible_artifacts[0].first_stable_at, secs(0.0));

    let result = engine.process(&frame(3), &[], secs(4.0));
    assert_eq!(result.visible_artifacts.len(), 1);

    let result = engine.process(&frame(4), &[], secs(4.001));
    assert!(result.visible_artifacts.is_empty());
    assert_eq!(engine.artifact_count(), 0);
    assert_eq!(engine.stats().evictions, 1);
    // The sighting itself stays in history.
    assert_eq!(result.history, vec!["P.102".to_string()]);
}

#[test]
fn reprocessing_the_same_frame_is_idempotent() {
    let mut engine = engine(immediate());
    engine.process(&frame(0), &[sign("P.102")], secs(0.0));

    let detections = [sign("P.102"), sign("W.201")];
    let first = engine.process(&frame(1), &detections, secs(0.3));
    let last_seen = engine.artifact("P.102").map(|e| e.last_seen_at());
    let second = engine.process(&frame(1), &detections, secs(0.3));

    assert_eq!(first, second);
    assert_eq!(engine.artifact("P.102").map(|e| e.last_seen_at()), last_seen);
    assert_eq!(engine.history().len(), 2);
    assert_eq!(engine.stats().sightings, 2);
}

#[test]
fn failed_crop_still_records_the_sighting() {
    let mut engine = engine(immediate());
    let outside = Detection::new("R.301", BoundingBox::new(100.0, 100.0, 120.0, 120.0), 0.8);
    let result = engine.process(&frame(0), &[outside], secs(0.0));

    assert_eq!(result.history, vec!["R.301".to_string()]);
    assert!(result.visible_artifacts.is_empty());
    assert_eq!(engine.stats().crop_failures, 1);
}

#[test]
fn reset_clears_all_sighting_state() {
    let mut engine = engine(immediate());
    engine.process(&frame(0), &[sign("P.102")], secs(0.0));
    assert_eq!(engine.artifact_count(), 1);

    engine.reset();
    assert!(engine.history().is_empty());
    assert!(engine.tracked_labels().is_empty());
    assert_eq!(engine.artifact_count(), 0);

    // A fresh session captures the label again, starting from t=0.
    let result = engine.process(&frame(0), &[sign("P.102")], secs(0.0));
    assert_eq!(result.visible_artifacts.len(), 1);
}
