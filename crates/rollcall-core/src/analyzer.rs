//! Recognition adapter — face detection and embedding extraction.
//!
//! The attendance loop only needs "(region, embedding) pairs per frame";
//! everything behind that contract is delegated to two ONNX models driven
//! through ONNX Runtime: an anchor-free multi-stride face detector and an
//! embedding network. This module is pre/post-processing only.

use crate::types::{BoundingBox, Detection, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DET_NMS_THRESHOLD: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
/// Crop a region this much larger than the detector box, so the whole
/// head lands in the embedding input.
const CROP_MARGIN: f32 = 1.3;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Per-frame face observation: the seam the decision loop consumes.
///
/// Implementations take a grayscale frame and report every detected face
/// with its embedding. Identity is resolved elsewhere.
pub trait FaceAnalyzer {
    fn analyze(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, AnalyzerError>;
}

/// ONNX-backed analyzer: detector + embedder sessions.
pub struct OnnxAnalyzer {
    detector: Session,
    embedder: Session,
    model_version: String,
}

impl OnnxAnalyzer {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, AnalyzerError> {
        for path in [detector_path, embedder_path] {
            if !Path::new(path).exists() {
                return Err(AnalyzerError::ModelNotFound(path.to_string()));
            }
        }

        let detector = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(detector_path)?;
        let embedder = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(embedder_path)?;

        // Positional output decoding needs one score and one box tensor
        // per stride.
        let num_outputs = detector.outputs().len();
        if num_outputs < 2 * DET_STRIDES.len() {
            return Err(AnalyzerError::InferenceFailed(format!(
                "detector must expose {} outputs (scores + boxes per stride), got {num_outputs}",
                2 * DET_STRIDES.len()
            )));
        }

        let model_version = Path::new(embedder_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            detector = detector_path,
            embedder = embedder_path,
            "recognition models loaded"
        );

        Ok(Self {
            detector,
            embedder,
            model_version,
        })
    }

    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, AnalyzerError> {
        let (boxed, lb) = letterbox(gray, width as usize, height as usize, DET_INPUT_SIZE);
        let input = to_tensor(&boxed, DET_INPUT_SIZE, DET_MEAN, DET_STD);

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Positional output layout: [0..3) = per-stride scores, [3..6) = boxes.
        let mut candidates = Vec::new();
        for (i, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| AnalyzerError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[i + DET_STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| AnalyzerError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;

            decode_stride(scores, boxes, stride, DET_INPUT_SIZE, &lb, &mut candidates);
        }

        let mut faces = nms(candidates, DET_NMS_THRESHOLD);
        // Largest face first: in a classroom frame the near faces matter most.
        faces.sort_by(|a, b| {
            (b.width * b.height)
                .partial_cmp(&(a.width * a.height))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(faces)
    }

    fn embed(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, AnalyzerError> {
        let crop = square_crop(gray, width as usize, height as usize, face, CROP_MARGIN);
        let resized = resize_gray(&crop.data, crop.side, crop.side, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE);
        let input = to_tensor(&resized, EMBED_INPUT_SIZE, EMBED_MEAN, EMBED_STD);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("embedding: {e}")))?;

        if raw.is_empty() {
            return Err(AnalyzerError::InferenceFailed(
                "embedder produced an empty vector".to_string(),
            ));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(self.model_version.clone()),
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = self.detect(gray, width, height)?;
        let mut detections = Vec::with_capacity(faces.len());
        for bbox in faces {
            let embedding = self.embed(gray, width, height, &bbox)?;
            detections.push(Detection { bbox, embedding });
        }
        Ok(detections)
    }
}

/// Letterbox mapping between original frame space and the square model input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Map a coordinate from model-input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Scale the frame to fit a `size`×`size` square, padding the remainder.
fn letterbox(gray: &[u8], width: usize, height: usize, size: usize) -> (Vec<u8>, Letterbox) {
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as usize).max(1);
    let new_h = ((height as f32 * scale).round() as usize).max(1);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = resize_gray(gray, width, height, new_w, new_h);

    let mut out = vec![DET_MEAN as u8; size * size];
    for y in 0..new_h {
        let dst = (y + pad_y) * size + pad_x;
        out[dst..dst + new_w].copy_from_slice(&resized[y * new_w..(y + 1) * new_w]);
    }

    (
        out,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Bilinear grayscale resize.
fn resize_gray(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dw * dh];
    let x_ratio = sw as f32 / dw as f32;
    let y_ratio = sh as f32 / dh as f32;

    for dy in 0..dh {
        let sy = ((dy as f32 + 0.5) * y_ratio - 0.5).max(0.0);
        let y0 = (sy as usize).min(sh - 1);
        let y1 = (y0 + 1).min(sh - 1);
        let fy = sy - y0 as f32;

        for dx in 0..dw {
            let sx = ((dx as f32 + 0.5) * x_ratio - 0.5).max(0.0);
            let x0 = (sx as usize).min(sw - 1);
            let x1 = (x0 + 1).min(sw - 1);
            let fx = sx - x0 as f32;

            let tl = src[y0 * sw + x0] as f32;
            let tr = src[y0 * sw + x1] as f32;
            let bl = src[y1 * sw + x0] as f32;
            let br = src[y1 * sw + x1] as f32;

            let top = tl + (tr - tl) * fx;
            let bot = bl + (br - bl) * fx;
            dst[dy * dw + dx] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
    }

    dst
}

/// Build a 1×3×size×size NCHW tensor from a square grayscale image,
/// replicating the single channel.
fn to_tensor(gray: &[u8], size: usize, mean: f32, std: f32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let v = (gray[y * size + x] as f32 - mean) / std;
            for c in 0..3 {
                tensor[[0, c, y, x]] = v;
            }
        }
    }
    tensor
}

/// Decode one stride level of the anchor-free detector head into frame-space
/// candidate boxes.
///
/// Layout per stride: `scores[a]` is the confidence of anchor `a`, and
/// `boxes[a*4..]` holds left/top/right/bottom offsets from the anchor
/// center, in stride units.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    stride: usize,
    input_size: usize,
    lb: &Letterbox,
    out: &mut Vec<BoundingBox>,
) {
    let grid = input_size / stride;
    let anchors = grid * grid * DET_ANCHORS_PER_CELL;

    for a in 0..anchors.min(scores.len()) {
        let confidence = scores[a];
        if confidence <= DET_CONFIDENCE_THRESHOLD {
            continue;
        }
        let off = a * 4;
        if off + 3 >= boxes.len() {
            break;
        }

        let cell = a / DET_ANCHORS_PER_CELL;
        let cx = ((cell % grid) * stride) as f32;
        let cy = ((cell / grid) * stride) as f32;
        let s = stride as f32;

        let (x1, y1) = lb.unmap(cx - boxes[off] * s, cy - boxes[off + 1] * s);
        let (x2, y2) = lb.unmap(cx + boxes[off + 2] * s, cy + boxes[off + 3] * s);

        out.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }
}

/// Non-maximum suppression, keeping the highest-confidence box per cluster.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
    let iy = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    let inter = ix.max(0.0) * iy.max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

struct Crop {
    data: Vec<u8>,
    side: usize,
}

/// Extract a square crop centered on the face box, grown by `margin` and
/// clamped to the frame. Out-of-frame area reads as black.
fn square_crop(gray: &[u8], width: usize, height: usize, face: &BoundingBox, margin: f32) -> Crop {
    let (cx, cy) = face.center();
    let side = (face.width.max(face.height) * margin).max(1.0) as usize;
    let half = side as f32 / 2.0;
    let x0 = (cx - half).round() as i64;
    let y0 = (cy - half).round() as i64;

    let mut data = vec![0u8; side * side];
    for dy in 0..side {
        let sy = y0 + dy as i64;
        if sy < 0 || sy >= height as i64 {
            continue;
        }
        for dx in 0..side {
            let sx = x0 + dx as i64;
            if sx < 0 || sx >= width as i64 {
                continue;
            }
            data[dy * side + dx] = gray[sy as usize * width + sx as usize];
        }
    }

    Crop { data, side }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![77u8; 40 * 30];
        let dst = resize_gray(&src, 40, 30, 64, 64);
        assert_eq!(dst.len(), 64 * 64);
        assert!(dst.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_resize_identity() {
        let src: Vec<u8> = (0..16).collect();
        let dst = resize_gray(&src, 4, 4, 4, 4);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let gray = vec![0u8; 320 * 240];
        let (_, lb) = letterbox(&gray, 320, 240, DET_INPUT_SIZE);

        // Map a frame point into letterbox space and back.
        let (fx, fy) = (100.0f32, 50.0f32);
        let lx = fx * lb.scale + lb.pad_x;
        let ly = fy * lb.scale + lb.pad_y;
        let (rx, ry) = lb.unmap(lx, ly);
        assert!((rx - fx).abs() < 0.5);
        assert!((ry - fy).abs() < 0.5);
    }

    #[test]
    fn test_letterbox_output_is_square() {
        let gray = vec![200u8; 100 * 50];
        let (out, _) = letterbox(&gray, 100, 50, 64);
        assert_eq!(out.len(), 64 * 64);
    }

    #[test]
    fn test_to_tensor_replicates_channels() {
        let gray = vec![128u8; 4 * 4];
        let t = to_tensor(&gray, 4, 127.5, 128.0);
        assert_eq!(t.shape(), &[1, 3, 4, 4]);
        let expected = (128.0 - 127.5) / 128.0;
        for c in 0..3 {
            assert!((t[[0, c, 2, 2]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_iou_contained_box() {
        let outer = bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        let inner = bbox(25.0, 25.0, 50.0, 50.0, 1.0);
        // Intersection = inner area = 2500; union = outer area = 10000.
        assert!((iou(&outer, &inner) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(100.0, 0.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_cluster() {
        let cluster = vec![
            bbox(0.0, 0.0, 50.0, 50.0, 0.7),
            bbox(2.0, 2.0, 50.0, 50.0, 0.95),
            bbox(4.0, 0.0, 50.0, 50.0, 0.8),
        ];
        let kept = nms(cluster, 0.4);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_nms_separate_faces_survive() {
        let faces = vec![
            bbox(0.0, 0.0, 40.0, 40.0, 0.9),
            bbox(300.0, 10.0, 40.0, 40.0, 0.6),
            bbox(150.0, 200.0, 40.0, 40.0, 0.8),
        ];
        assert_eq!(nms(faces, 0.4).len(), 3);
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        // Two anchors: one above and one below the confidence threshold.
        let scores = vec![0.9, 0.1];
        let boxes = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mut out = Vec::new();
        decode_stride(&scores, &boxes, 8, 16, &lb, &mut out);
        assert_eq!(out.len(), 1);
        // Anchor 0 sits at cell (0,0): box spans ±8 around the origin.
        assert!((out[0].width - 16.0).abs() < 1e-6);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_square_crop_clamps_at_edges() {
        // Face at the top-left corner: crop must not panic and reads
        // out-of-frame pixels as black.
        let width = 20usize;
        let height = 20usize;
        let gray = vec![255u8; width * height];
        let face = bbox(0.0, 0.0, 10.0, 10.0, 0.9);

        let crop = square_crop(&gray, width, height, &face, 1.3);
        assert_eq!(crop.data.len(), crop.side * crop.side);
        assert!(crop.data.contains(&0));
        assert!(crop.data.contains(&255));
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
