//! ONNX embedding descriptor extractor.
//!
//! Delegates the face crop to an external embedding model and tags the
//! resulting vector with the model name, so descriptors from different
//! models can never be cross-compared.

use crate::extractor::{crop_region, l2_normalize, DescriptorExtractor, ExtractError};
use crate::types::{Descriptor, DescriptorTag, FaceRegion};
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Guards the embedding L2 normalization.
const NORM_EPSILON: f32 = 1e-7;

/// Preprocessing profile of one embedding model: canonical input size and
/// normalization constants differ per model lineage.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// Model name, stamped on every produced descriptor.
    pub name: String,
    /// Square input side in pixels.
    pub input_size: u32,
    pub mean: f32,
    pub std: f32,
    /// Expected embedding dimension, checked after inference when known.
    pub embedding_dim: Option<usize>,
}

impl ModelProfile {
    /// FaceNet profile: 160×160 input, 128-dim output.
    pub fn facenet() -> Self {
        Self {
            name: "Facenet".to_string(),
            input_size: 160,
            mean: 127.5,
            std: 128.0,
            embedding_dim: Some(128),
        }
    }

    /// ArcFace profile: 112×112 input, symmetric normalization, 512-dim.
    pub fn arcface() -> Self {
        Self {
            name: "ArcFace".to_string(),
            input_size: 112,
            mean: 127.5,
            std: 127.5,
            embedding_dim: Some(512),
        }
    }

    /// Profile for a model name, falling back to ArcFace-style
    /// preprocessing with an unchecked output dimension.
    pub fn for_name(name: &str) -> Self {
        match name {
            "Facenet" => Self::facenet(),
            "ArcFace" => Self::arcface(),
            other => Self {
                name: other.to_string(),
                input_size: 112,
                mean: 127.5,
                std: 127.5,
                embedding_dim: None,
            },
        }
    }
}

/// Embedding-model descriptor extractor.
pub struct OnnxEmbeddingExtractor {
    session: Session,
    profile: ModelProfile,
}

impl OnnxEmbeddingExtractor {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str, profile: ModelProfile) -> Result<Self, ExtractError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            model = %profile.name,
            input_size = profile.input_size,
            "loaded embedding model"
        );

        Ok(Self { session, profile })
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    /// Preprocess the face crop into a normalized NCHW RGB tensor.
    fn preprocess(&self, face: &DynamicImage) -> Array4<f32> {
        let size = self.profile.input_size as usize;
        let resized = face
            .resize_exact(
                self.profile.input_size,
                self.profile.input_size,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let pixel = resized.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    tensor[[0, c, y, x]] =
                        (pixel[c] as f32 - self.profile.mean) / self.profile.std;
                }
            }
        }

        tensor
    }
}

impl DescriptorExtractor for OnnxEmbeddingExtractor {
    fn tag(&self) -> DescriptorTag {
        DescriptorTag::Embedding(self.profile.name.clone())
    }

    fn extract(
        &mut self,
        image: &DynamicImage,
        region: &FaceRegion,
    ) -> Result<Descriptor, ExtractError> {
        let face = crop_region(image, region)?;
        let input = self.preprocess(&face);
        let tag = self.tag();

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let mut values: Vec<f32> = raw_data.to_vec();

        if values.is_empty() {
            return Err(ExtractError::InferenceFailed(
                "model produced an empty embedding".to_string(),
            ));
        }
        if let Some(expected) = self.profile.embedding_dim {
            if values.len() != expected {
                return Err(ExtractError::InferenceFailed(format!(
                    "expected {expected}-dim embedding, got {}",
                    values.len()
                )));
            }
        }

        l2_normalize(&mut values, NORM_EPSILON);

        Ok(Descriptor::new(tag, values))
    }
}
