//! Identity resolution — mapping an observed embedding to an enrolled name.
//!
//! Policy: among all enrolled encodings, pick the minimum-distance
//! candidate and accept it only if the distance is within the configured
//! tolerance; otherwise the face is unknown.

use crate::types::{Embedding, EnrolledFace};

/// Outcome of resolving one observed embedding against the roster.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Best match was within tolerance.
    Known { name: String, distance: f32 },
    /// No enrolled encoding was close enough. `best_distance` is the
    /// nearest miss, if the roster was non-empty.
    Unknown { best_distance: Option<f32> },
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known { .. })
    }
}

/// Strategy for resolving a probe embedding against enrolled faces.
pub trait Matcher {
    fn resolve(&self, probe: &Embedding, enrolled: &[EnrolledFace], tolerance: f32) -> Identity;
}

/// Nearest-neighbor matcher over euclidean distance.
///
/// Every enrolled encoding is compared; a person enrolled with several
/// samples matches through whichever sample is closest.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn resolve(&self, probe: &Embedding, enrolled: &[EnrolledFace], tolerance: f32) -> Identity {
        let mut best: Option<(usize, f32)> = None;

        for (i, face) in enrolled.iter().enumerate() {
            let dist = probe.euclidean_distance(&face.embedding);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        match best {
            Some((idx, distance)) if distance <= tolerance => Identity::Known {
                name: enrolled[idx].name.clone(),
                distance,
            },
            Some((_, distance)) => Identity::Unknown {
                best_distance: Some(distance),
            },
            None => Identity::Unknown {
                best_distance: None,
            },
        }
    }
}
