//! Descriptor extraction seam.
//!
//! Two interchangeable strategies implement [`DescriptorExtractor`]: the
//! handcrafted histogram descriptor and the ONNX embedding adapter. Which
//! one runs is a construction-time configuration decision, not a runtime
//! branch inside the pipeline.

use crate::types::{Descriptor, DescriptorTag, FaceRegion};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("face region has zero area")]
    EmptyRegion,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("model file not found: {0} — place the embedding model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Converts a located face region into a fixed-length descriptor.
pub trait DescriptorExtractor {
    /// Tag stamped on every descriptor this extractor produces.
    fn tag(&self) -> DescriptorTag;

    /// Extract a descriptor from the face region of `image`.
    ///
    /// The region must already be clipped to image bounds; a zero-area
    /// region fails with [`ExtractError::EmptyRegion`].
    fn extract(
        &mut self,
        image: &DynamicImage,
        region: &FaceRegion,
    ) -> Result<Descriptor, ExtractError>;
}

/// Crop the face region out of the full image, failing on degenerate boxes.
pub(crate) fn crop_region(
    image: &DynamicImage,
    region: &FaceRegion,
) -> Result<DynamicImage, ExtractError> {
    if region.width == 0 || region.height == 0 {
        return Err(ExtractError::EmptyRegion);
    }
    Ok(image.crop_imm(region.x, region.y, region.width, region.height))
}

/// L2-normalize in place so the vector lies on (approximately) the unit
/// hypersphere. The epsilon keeps all-zero inputs finite.
pub(crate) fn l2_normalize(values: &mut [f32], epsilon: f32) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denom = norm + epsilon;
    for v in values.iter_mut() {
        *v /= denom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_region_rejects_zero_area() {
        let image = DynamicImage::new_rgb8(32, 32);
        let region = FaceRegion {
            x: 4,
            y: 4,
            width: 0,
            height: 10,
            confidence: 0.9,
        };
        assert!(matches!(
            crop_region(&image, &region),
            Err(ExtractError::EmptyRegion)
        ));
    }

    #[test]
    fn test_crop_region_dimensions() {
        let image = DynamicImage::new_rgb8(64, 64);
        let region = FaceRegion {
            x: 8,
            y: 16,
            width: 20,
            height: 24,
            confidence: 0.9,
        };
        let crop = crop_region(&image, &region).unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 24));
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let mut values = vec![3.0, 4.0];
        l2_normalize(&mut values, 1e-7);
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_l2_normalize_zero_vector_stays_finite() {
        let mut values = vec![0.0; 8];
        l2_normalize(&mut values, 1e-7);
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
