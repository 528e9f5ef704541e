//! facegrade-core — Face similarity matching engine.
//!
//! Rates photos by how closely the depicted face resembles a set of
//! reference ("benchmark") faces: locate a face region, extract a
//! descriptor (handcrafted histograms or an ONNX embedding model), score
//! it against every benchmark entry, and quantize the best match into a
//! 1–5 star rating with per-(strategy, metric) calibration.

pub mod batch;
pub mod benchmark;
pub mod detector;
pub mod embedding;
pub mod extractor;
pub mod handcrafted;
pub mod pipeline;
pub mod rating;
pub mod similarity;
pub mod types;

pub use batch::run_batch;
pub use benchmark::BenchmarkSet;
pub use detector::{FaceLocator, LocateError, SsdFaceLocator, DEFAULT_CONFIDENCE_THRESHOLD};
pub use embedding::{ModelProfile, OnnxEmbeddingExtractor};
pub use extractor::{DescriptorExtractor, ExtractError};
pub use handcrafted::HandcraftedExtractor;
pub use pipeline::Pipeline;
pub use rating::{ThresholdBook, ThresholdError, ThresholdTable};
pub use similarity::{score, Metric};
pub use types::{
    BenchmarkEntry, ComparisonResult, Descriptor, DescriptorTag, FaceRegion, MatchError,
    MatchReport, UnratedReason,
};
