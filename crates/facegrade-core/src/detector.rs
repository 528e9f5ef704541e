//! SSD ResNet-10 face locator via ONNX Runtime.
//!
//! Runs the 300×300 single-shot face detector and applies the
//! "most confident face only" policy: the engine rates one dominant
//! subject per photo, never multi-face scenes.

use crate::types::FaceRegion;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SSD_INPUT_SIZE: usize = 300;
/// Per-channel means in BGR order, matching the detector's training data.
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
/// Each detection row: [image_id, label, confidence, x1, y1, x2, y2].
const SSD_DETECTION_FIELDS: usize = 7;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("model file not found: {0} — download the res10 SSD face model and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds the bounding region most likely to contain a usable face.
///
/// Returns `Ok(None)` when no detection clears the confidence threshold —
/// an expected, common outcome, not a fault.
pub trait FaceLocator {
    fn locate(&mut self, image: &DynamicImage) -> Result<Option<FaceRegion>, LocateError>;
}

/// SSD-based face locator.
pub struct SsdFaceLocator {
    session: Session,
    confidence_threshold: f32,
}

impl SsdFaceLocator {
    /// Load the SSD ONNX model from the given path.
    pub fn load(model_path: &str, confidence_threshold: f32) -> Result<Self, LocateError> {
        if !Path::new(model_path).exists() {
            return Err(LocateError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            threshold = confidence_threshold,
            "loaded SSD face detection model"
        );

        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    /// Preprocess a decoded image into a 1×3×300×300 BGR tensor with
    /// per-channel mean subtraction.
    fn preprocess(image: &DynamicImage) -> Array4<f32> {
        let resized = image
            .resize_exact(
                SSD_INPUT_SIZE as u32,
                SSD_INPUT_SIZE as u32,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, SSD_INPUT_SIZE, SSD_INPUT_SIZE));
        for y in 0..SSD_INPUT_SIZE {
            for x in 0..SSD_INPUT_SIZE {
                let pixel = resized.get_pixel(x as u32, y as u32);
                // Channel order is BGR, as the Caffe-lineage model expects.
                tensor[[0, 0, y, x]] = pixel[2] as f32 - SSD_MEAN_BGR[0];
                tensor[[0, 1, y, x]] = pixel[1] as f32 - SSD_MEAN_BGR[1];
                tensor[[0, 2, y, x]] = pixel[0] as f32 - SSD_MEAN_BGR[2];
            }
        }

        tensor
    }
}

impl FaceLocator for SsdFaceLocator {
    fn locate(&mut self, image: &DynamicImage) -> Result<Option<FaceRegion>, LocateError> {
        let (width, height) = (image.width(), image.height());
        let input = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, detections) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocateError::InferenceFailed(format!("detection output: {e}")))?;

        let best = best_detection(detections, self.confidence_threshold);

        let Some((confidence, [x1, y1, x2, y2])) = best else {
            tracing::debug!(width, height, "no face above confidence threshold");
            return Ok(None);
        };

        let region = clip_region(
            x1 * width as f32,
            y1 * height as f32,
            x2 * width as f32,
            y2 * height as f32,
            width,
            height,
            confidence,
        );

        if region.is_none() {
            tracing::debug!(confidence, "detection degenerated to zero area after clipping");
        }

        Ok(region)
    }
}

/// Scan flattened SSD detection rows and return the single most confident
/// detection above `threshold`, as (confidence, normalized [x1, y1, x2, y2]).
fn best_detection(detections: &[f32], threshold: f32) -> Option<(f32, [f32; 4])> {
    let mut best: Option<(f32, [f32; 4])> = None;

    for row in detections.chunks_exact(SSD_DETECTION_FIELDS) {
        let confidence = row[2];
        if confidence <= threshold {
            continue;
        }
        if best.map(|(c, _)| confidence > c).unwrap_or(true) {
            best = Some((confidence, [row[3], row[4], row[5], row[6]]));
        }
    }

    best
}

/// Clip a pixel-space box to image bounds. Returns `None` when the clipped
/// box has zero area (detections can land entirely outside the frame).
#[allow(clippy::too_many_arguments)]
fn clip_region(
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    width: u32,
    height: u32,
    confidence: f32,
) -> Option<FaceRegion> {
    let x1 = x1.max(0.0).min(width as f32) as u32;
    let y1 = y1.max(0.0).min(height as f32) as u32;
    let x2 = x2.max(0.0).min(width as f32) as u32;
    let y2 = y2.max(0.0).min(height as f32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(FaceRegion {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
        confidence,
    })
}
