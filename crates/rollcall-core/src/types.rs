use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Center point of the box.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Face embedding vector produced by the embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding.
    pub model_version: Option<String>,
}

impl Embedding {
    /// Euclidean distance to another embedding. Lower = more similar.
    ///
    /// Embeddings are L2-normalized at extraction time, so distances fall
    /// in [0, 2] and a tolerance around 0.5 separates same/different faces.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled face encoding with metadata. A person may have several,
/// one per captured enrollment sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    pub created_at: String,
}

/// One face observed in one frame: where it is and what it encodes to.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}
