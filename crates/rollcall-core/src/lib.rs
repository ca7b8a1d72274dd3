//! rollcall-core — Face recognition plumbing for the attendance system.
//!
//! Holds the enrolled-face roster, resolves observed embeddings to known
//! identities, and wraps the ONNX detection/embedding models behind the
//! [`FaceAnalyzer`] seam.

pub mod analyzer;
pub mod identity;
pub mod roster;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use identity::{Identity, Matcher, NearestMatcher};
pub use roster::{Roster, RosterError};
pub use types::{BoundingBox, Detection, Embedding, EnrolledFace};
