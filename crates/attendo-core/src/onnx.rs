//! ONNX-backed embedding provider.
//!
//! Two models behind one [`EmbeddingProvider`]: an UltraFace-style single-shot
//! face detector (two output heads: scores and normalized corner boxes) and an
//! embedding network taking a 112x112 face crop. Both run on CPU via ONNX
//! Runtime.

use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{DetectionResult, Embedding, Region};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// Detector head
const DET_INPUT_WIDTH: usize = 320;
const DET_INPUT_HEIGHT: usize = 240;
const DET_MEAN: f32 = 127.0;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DET_NMS_THRESHOLD: f32 = 0.4;

// Embedding head
const EMB_INPUT_SIZE: usize = 112;
const EMB_MEAN: f32 = 127.5;
const EMB_STD: f32 = 127.5;

/// Margin added around a detector box before cropping for embedding,
/// as a fraction of the box's larger side.
const CROP_MARGIN: f32 = 0.2;

/// ONNX-backed face detection + embedding extraction.
pub struct OnnxEmbeddingProvider {
    detector: Session,
    embedder: Session,
    /// Detector output indices (scores, boxes), discovered by name at load.
    det_outputs: (usize, usize),
}

impl OnnxEmbeddingProvider {
    /// Load both models from disk. Fails fast if either file is missing.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, ProviderError> {
        for path in [detector_path, embedder_path] {
            if !Path::new(path).exists() {
                return Err(ProviderError::ModelNotFound(path.to_string()));
            }
        }

        let detector = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::<()>::from)?
            .commit_from_file(detector_path)?;

        let output_names: Vec<String> = detector
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if output_names.len() < 2 {
            return Err(ProviderError::InferenceFailed(format!(
                "detector needs 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }
        let det_outputs = discover_detector_outputs(&output_names);

        tracing::info!(
            path = detector_path,
            outputs = ?output_names,
            "face detector loaded"
        );

        let embedder = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::<()>::from)?
            .commit_from_file(embedder_path)?;

        tracing::info!(
            path = embedder_path,
            outputs = ?embedder.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "embedding model loaded"
        );

        Ok(Self {
            detector,
            embedder,
            det_outputs,
        })
    }

    fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Region>, ProviderError> {
        let input = detector_preprocess(frame, width as usize, height as usize)?;
        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (score_idx, box_idx) = self.det_outputs;
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("detector scores: {e}")))?;
        let (_, boxes) = outputs[box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("detector boxes: {e}")))?;

        let candidates = decode_detections(
            scores,
            boxes,
            width as f32,
            height as f32,
            DET_CONFIDENCE_THRESHOLD,
        );
        let mut regions = nms(candidates, DET_NMS_THRESHOLD);
        regions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(regions)
    }

    fn embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        region: &Region,
    ) -> Result<Embedding, ProviderError> {
        let crop = crop_resize(
            frame,
            width as usize,
            height as usize,
            region,
            CROP_MARGIN,
            EMB_INPUT_SIZE,
        );
        let input = embedder_preprocess(&crop);
        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.is_empty() {
            return Err(ProviderError::InferenceFailed(
                "embedding model produced an empty vector".into(),
            ));
        }

        Ok(Embedding::new(l2_normalize(raw.to_vec())))
    }
}

impl EmbeddingProvider for OnnxEmbeddingProvider {
    fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectionResult>, ProviderError> {
        if frame.len() < (width * height) as usize {
            return Err(ProviderError::BadFrame(format!(
                "frame buffer too short: expected {}, got {}",
                width * height,
                frame.len()
            )));
        }

        let regions = self.detect(frame, width, height)?;
        tracing::debug!(faces = regions.len(), "detector pass complete");

        let mut results = Vec::with_capacity(regions.len());
        for region in regions {
            let embedding = self.embed(frame, width, height, &region)?;
            results.push(DetectionResult { region, embedding });
        }
        Ok(results)
    }
}

/// Find the (scores, boxes) output indices by name, falling back to
/// positional [0, 1] when the export uses generic names.
fn discover_detector_outputs(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(?names, "detector output names not recognized, using positional [0]=scores, [1]=boxes");
            (0, 1)
        }
    }
}

/// Resize a grayscale frame to the detector input and normalize to NCHW,
/// replicating the single channel across RGB.
fn detector_preprocess(
    frame: &[u8],
    width: usize,
    height: usize,
) -> Result<Array4<f32>, ProviderError> {
    if width == 0 || height == 0 {
        return Err(ProviderError::BadFrame("zero-sized frame".into()));
    }

    let resized = bilinear_resize(frame, width, height, DET_INPUT_WIDTH, DET_INPUT_HEIGHT);

    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_HEIGHT, DET_INPUT_WIDTH));
    for y in 0..DET_INPUT_HEIGHT {
        for x in 0..DET_INPUT_WIDTH {
            let normalized = (resized[y * DET_INPUT_WIDTH + x] as f32 - DET_MEAN) / DET_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }
    Ok(tensor)
}

/// Decode UltraFace-style outputs: scores [N, 2] (background, face) and
/// boxes [N, 4] as normalized corners, mapped back to frame coordinates.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    frame_width: f32,
    frame_height: f32,
    threshold: f32,
) -> Vec<Region> {
    let n = scores.len() / 2;
    let mut detections = Vec::new();

    for idx in 0..n {
        let confidence = scores[idx * 2 + 1];
        if confidence <= threshold {
            continue;
        }
        let off = idx * 4;
        if off + 3 >= boxes.len() {
            break;
        }
        let x1 = boxes[off] * frame_width;
        let y1 = boxes[off + 1] * frame_height;
        let x2 = boxes[off + 2] * frame_width;
        let y2 = boxes[off + 3] * frame_height;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        detections.push(Region {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: keep the highest-confidence region of each
/// overlapping cluster.
fn nms(mut detections: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Region> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &Region, b: &Region) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Cut a square crop around the region (expanded by `margin`) and resize it
/// to `out_size` x `out_size` with bilinear sampling. Out-of-frame samples
/// clamp to the nearest edge pixel.
fn crop_resize(
    frame: &[u8],
    width: usize,
    height: usize,
    region: &Region,
    margin: f32,
    out_size: usize,
) -> Vec<u8> {
    let side = region.width.max(region.height) * (1.0 + margin);
    let cx = region.x + region.width / 2.0;
    let cy = region.y + region.height / 2.0;
    let x0 = cx - side / 2.0;
    let y0 = cy - side / 2.0;
    let step = side / out_size as f32;

    let mut out = vec![0u8; out_size * out_size];
    for oy in 0..out_size {
        let src_y = y0 + (oy as f32 + 0.5) * step - 0.5;
        for ox in 0..out_size {
            let src_x = x0 + (ox as f32 + 0.5) * step - 0.5;
            out[oy * out_size + ox] = sample_bilinear(frame, width, height, src_x, src_y);
        }
    }
    out
}

fn sample_bilinear(frame: &[u8], width: usize, height: usize, x: f32, y: f32) -> u8 {
    let x0 = (x.floor() as i64).clamp(0, width as i64 - 1) as usize;
    let y0 = (y.floor() as i64).clamp(0, height as i64 - 1) as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (x - x.floor()).clamp(0.0, 1.0);
    let fy = (y - y.floor()).clamp(0.0, 1.0);

    let tl = frame[y0 * width + x0] as f32;
    let tr = frame[y0 * width + x1] as f32;
    let bl = frame[y1 * width + x0] as f32;
    let br = frame[y1 * width + x1] as f32;

    let val = tl * (1.0 - fx) * (1.0 - fy)
        + tr * fx * (1.0 - fy)
        + bl * (1.0 - fx) * fy
        + br * fx * fy;
    val.round().clamp(0.0, 255.0) as u8
}

fn bilinear_resize(
    frame: &[u8],
    width: usize,
    height: usize,
    out_w: usize,
    out_h: usize,
) -> Vec<u8> {
    let scale_x = width as f32 / out_w as f32;
    let scale_y = height as f32 / out_h as f32;

    let mut out = vec![0u8; out_w * out_h];
    for y in 0..out_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        for x in 0..out_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            out[y * out_w + x] = sample_bilinear(frame, width, height, src_x, src_y);
        }
    }
    out
}

/// Preprocess a face crop into the embedder's NCHW input, replicating the
/// grayscale channel across RGB.
fn embedder_preprocess(crop: &[u8]) -> Array4<f32> {
    let size = EMB_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = crop.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - EMB_MEAN) / EMB_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }
    tensor
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}
