//! sightingd - traffic sign sighting daemon
//!
//! This daemon:
//! 1. Opens the configured frame source (synthetic scene or image sequence)
//! 2. Runs the configured detector on every frame in a background pump
//! 3. Stabilizes detections into sightings and snapshots
//! 4. Logs each new sighting and writes newly visible snapshots as PNG
//! 5. Prints a summary when the stream ends or Ctrl-C is pressed

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sighting_kernel::config::SightingdConfig;
use sighting_kernel::detect::{ColorBackend, ScriptedBackend};
use sighting_kernel::{
    source_from_config, BackendRegistry, LabelCatalog, SessionController, SessionState,
    SessionUpdate,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about = "Stabilize traffic sign detections into sightings")]
struct Args {
    /// Frame source: `stub://name` or a directory of still frames.
    #[arg(long)]
    source: Option<String>,

    /// Detector backend (`color` or `scripted`).
    #[arg(long)]
    detector: Option<String>,

    /// TOML cue script for the scripted detector.
    #[arg(long, env = "SIGHTING_SCRIPT_PATH")]
    script: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long, env = "SIGHTING_FRAME_LIMIT")]
    frames: Option<u64>,

    /// Directory for snapshot PNGs.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Process frames as fast as possible instead of at the source frame rate.
    #[arg(long)]
    no_pace: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SightingdConfig::load()?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(detector) = args.detector {
        cfg.detector.backend = detector.to_lowercase();
    }
    if let Some(script) = args.script {
        cfg.detector.script_path = Some(script);
    }
    if args.frames.is_some() {
        cfg.source.frame_limit = args.frames;
    }
    if let Some(dir) = args.snapshot_dir {
        cfg.snapshot_dir = Some(dir);
    }
    if args.no_pace {
        cfg.session.pace = false;
    }

    let catalog = Arc::new(match &cfg.labels_path {
        Some(path) => LabelCatalog::load(path)?,
        None => LabelCatalog::new(),
    });
    log::info!("label catalog: {} captions", catalog.len());

    let mut registry = BackendRegistry::new();
    registry.register(ColorBackend::default());
    registry.register(match &cfg.detector.script_path {
        Some(path) => ScriptedBackend::load(path)?,
        None => ScriptedBackend::default(),
    });
    registry.set_default(&cfg.detector.backend)?;
    let detector = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    log::info!(
        "detector: {} (available: {})",
        cfg.detector.backend,
        registry.list().join(", ")
    );

    if let Some(dir) = &cfg.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
    }

    let source = source_from_config(&cfg.source)?;
    let mut controller = SessionController::new(cfg.session, Arc::clone(&catalog), detector);
    let handle = controller.handle();
    ctrlc::set_handler(move || {
        handle.request_stop();
    })
    .expect("error setting Ctrl-C handler");

    controller.start(source)?;
    log::info!(
        "sightingd running: stable={:?} timeout={:?} delay={:?} display={:?} clock={:?}",
        cfg.session.stabilizer.stable_duration,
        cfg.session.stabilizer.buffer_timeout,
        cfg.session.stabilizer.capture_delay,
        cfg.session.stabilizer.display_duration,
        cfg.session.clock
    );

    let mut report = Report::new(cfg.snapshot_dir.clone(), Arc::clone(&catalog));
    loop {
        if let Some(update) = controller.recv_timeout(POLL_INTERVAL) {
            report.observe(&update)?;
            continue;
        }
        if controller.state() == SessionState::Idle {
            if let Some(update) = controller.try_recv() {
                report.observe(&update)?;
            }
            break;
        }
    }
    controller.stop()?;

    let stats = controller.stats();
    println!("frames processed:  {}", stats.frames_processed);
    println!("detector failures: {}", stats.detector_failures);
    println!("frames skipped:    {}", stats.superseded);
    println!("snapshots written: {}", report.snapshots_written);
    println!("sightings ({}):", report.history.len());
    for label in report.history.iter().rev() {
        println!("  {:<10} {}", label, catalog.caption(label));
    }
    Ok(())
}

struct Report {
    snapshot_dir: Option<PathBuf>,
    catalog: Arc<LabelCatalog>,
    /// Newest first, as delivered in the last update.
    history: Vec<String>,
    written: HashSet<[u8; 32]>,
    snapshots_written: usize,
}

impl Report {
    fn new(snapshot_dir: Option<PathBuf>, catalog: Arc<LabelCatalog>) -> Self {
        Self {
            snapshot_dir,
            catalog,
            history: Vec::new(),
            written: HashSet::new(),
            snapshots_written: 0,
        }
    }

    fn observe(&mut self, update: &SessionUpdate) -> Result<()> {
        let result = &update.result;
        let new_count = result.history.len().saturating_sub(self.history.len());
        for label in result.history.iter().take(new_count).rev() {
            log::info!(
                "sighting #{} at {:?}: {} ({})",
                result.history.len(),
                result.at,
                label,
                self.catalog.caption(label)
            );
        }
        self.history = result.history.clone();

        for artifact in &result.visible_artifacts {
            if !self.written.insert(artifact.image.digest()) {
                continue;
            }
            if let Some(dir) = &self.snapshot_dir {
                let path = write_snapshot(dir, &artifact.image)?;
                self.snapshots_written += 1;
                log::info!("snapshot for {} written to {}", artifact.label, path.display());
            }
        }
        Ok(())
    }
}

fn write_snapshot(dir: &Path, snapshot: &sighting_kernel::Snapshot) -> Result<PathBuf> {
    let path = dir.join(format!("{}.png", snapshot.digest_hex()));
    snapshot
        .image()
        .save(&path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    Ok(path)
}
