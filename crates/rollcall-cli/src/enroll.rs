//! Enrollment: capture face samples, extend the roster, save the contact.
//!
//! Each accepted sample is a frame with exactly one detected face; frames
//! with none or several are skipped so a bystander cannot end up in
//! someone else's roster entry. The raw frames are kept on disk alongside
//! the roster for re-enrollment after a model upgrade.

use anyhow::{bail, Context, Result};
use image::GrayImage;
use rollcall_core::{FaceAnalyzer, OnnxAnalyzer, Roster};
use rollcall_hw::Camera;
use rollcall_store::Store;

use crate::paths::Paths;

const CAMERA_RETRIES: usize = 3;
const WARMUP_FRAMES: usize = 4;
/// Upper bound on capture attempts per requested sample.
const ATTEMPTS_PER_SAMPLE: usize = 60;

pub fn run(paths: &Paths, name: &str, phone: &str, email: &str, samples: usize) -> Result<()> {
    let store = Store::open(&paths.db_path)?;
    let mut roster = Roster::load(&paths.roster_path)?;

    let mut analyzer =
        OnnxAnalyzer::load(&paths.detector_model_path(), &paths.embedder_model_path())?;
    let camera = Camera::open_with_retry(&paths.camera_device, CAMERA_RETRIES)
        .context("camera unavailable after retries")?;
    let mut stream = camera.stream()?;

    for _ in 0..WARMUP_FRAMES {
        let _ = stream.next_frame();
    }

    let person_dir = paths.faces_dir.join(name);
    std::fs::create_dir_all(&person_dir)
        .with_context(|| format!("failed to create {}", person_dir.display()))?;

    println!("Capturing {samples} sample(s) for {name}; look at the camera...");

    let mut captured = 0usize;
    let mut attempts = 0usize;
    while captured < samples {
        attempts += 1;
        if attempts > samples * ATTEMPTS_PER_SAMPLE {
            bail!(
                "gave up after {attempts} frames with only {captured}/{samples} usable samples; \
                 check lighting and that exactly one face is in view"
            );
        }

        let frame = stream.next_frame()?;
        if frame.is_dark() {
            continue;
        }

        let mut detections = match analyzer.analyze(&frame.data, frame.width, frame.height) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "frame analysis failed during enrollment");
                continue;
            }
        };

        if detections.len() != 1 {
            tracing::debug!(faces = detections.len(), "need exactly one face in frame");
            continue;
        }

        let detection = detections.remove(0);
        let sample_id = roster.add(name, detection.embedding);
        let image_path = person_dir.join(format!("{sample_id}.png"));

        let img = GrayImage::from_raw(frame.width, frame.height, frame.data)
            .context("frame buffer did not match its dimensions")?;
        img.save(&image_path)
            .with_context(|| format!("failed to save {}", image_path.display()))?;

        captured += 1;
        println!("  sample {captured}/{samples} captured ({})", image_path.display());
    }

    roster.save(&paths.roster_path)?;
    store.upsert_contact(name, Some(phone), Some(email))?;

    println!(
        "Enrolled {name}: {captured} sample(s), roster now holds {} encoding(s)",
        roster.len()
    );
    Ok(())
}
