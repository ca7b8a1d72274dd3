use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod notify;
mod reports;

use config::Config;
use engine::{DecisionLoop, Observation};
use notify::{EmailNotifier, LogTransport, MailTransport, Notifier};
use rollcall_core::{FaceAnalyzer, Matcher, NearestMatcher, OnnxAnalyzer, Roster};
use rollcall_hw::Camera;
use rollcall_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config::from_env();
    tracing::info!("rollcalld starting");

    let store = Store::open(&cfg.db_path)?;

    let roster = Roster::load(&cfg.roster_path)?;
    if roster.is_empty() {
        anyhow::bail!(
            "roster at {} is empty — enroll faces with `rollcall enroll` first",
            cfg.roster_path.display()
        );
    }

    let analyzer = OnnxAnalyzer::load(&cfg.detector_model_path(), &cfg.embedder_model_path())?;

    let camera = Camera::open_with_retry(&cfg.camera_device, cfg.camera_retries)
        .context("camera unavailable after retries")?;

    let transport: Arc<dyn MailTransport> = Arc::new(LogTransport);

    let recipients = reports::load_recipients(&cfg.recipients_path)?;
    reports::spawn_schedulers(recipients, cfg.db_path.clone(), transport.clone());

    // The dispatcher gets its own store handle; it may run while the
    // capture loop holds its own.
    let notifier = EmailNotifier::new(Store::open(&cfg.db_path)?, transport);

    tracing::info!("rollcalld ready");

    let capture = tokio::task::spawn_blocking(move || {
        run_capture_loop(&camera, analyzer, &roster, &store, &notifier, &cfg)
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("rollcalld shutting down");
        }
        result = capture => {
            result.context("capture loop panicked")??;
        }
    }

    Ok(())
}

/// The foreground loop: capture, subsample, recognize, decide.
fn run_capture_loop(
    camera: &Camera,
    mut analyzer: OnnxAnalyzer,
    roster: &Roster,
    store: &Store,
    notifier: &dyn Notifier,
    cfg: &Config,
) -> Result<()> {
    let mut stream = camera.stream()?;

    // Let the camera's auto-exposure settle before trusting frames.
    for _ in 0..cfg.warmup_frames {
        let _ = stream.next_frame();
    }

    let matcher = NearestMatcher;
    let mut decisions = DecisionLoop::new();
    let mut frame_count: u64 = 0;

    loop {
        let frame = stream.next_frame()?;

        frame_count += 1;
        if frame_count % cfg.frame_stride != 0 {
            continue;
        }
        if frame.is_dark() {
            tracing::debug!(sequence = frame.sequence, "skipping dark frame");
            continue;
        }

        let detections = match analyzer.analyze(&frame.data, frame.width, frame.height) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "frame analysis failed");
                continue;
            }
        };

        let now = Local::now();
        for detection in &detections {
            let identity = matcher.resolve(&detection.embedding, roster.faces(), cfg.match_tolerance);
            match decisions.observe(&identity, store, notifier, now) {
                Observation::Unrecognized => {
                    tracing::debug!(sequence = frame.sequence, "unrecognized face")
                }
                Observation::Marked(name) => {
                    tracing::info!(name = %name, "present")
                }
                Observation::AlreadyMarked { name, .. } => {
                    tracing::debug!(name = %name, "already marked")
                }
                Observation::Rejected(name, reason) => {
                    tracing::debug!(name = %name, ?reason, "mark rejected")
                }
                Observation::StoreBusy(name) => {
                    tracing::debug!(name = %name, "store busy, deferred")
                }
            }
        }

        std::thread::sleep(cfg.loop_pause);
    }
}
