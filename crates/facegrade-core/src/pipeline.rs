//! Single-image comparison pipeline: locate → extract → score → quantize.
//!
//! Per-image faults (unreadable file, no face, degenerate crop, extractor
//! failure) degrade to an unrated result; configuration faults (empty
//! benchmark set, incompatible descriptors) are hard errors.

use crate::benchmark::BenchmarkSet;
use crate::detector::FaceLocator;
use crate::extractor::{DescriptorExtractor, ExtractError};
use crate::rating::ThresholdBook;
use crate::similarity::{score, Metric};
use crate::types::{ComparisonResult, Descriptor, MatchError, MatchReport, UnratedReason};
use image::DynamicImage;
use std::path::Path;

/// Stateless-per-call comparison pipeline. Strategy and metric are fixed
/// at construction; no runtime branching on "which matcher am I".
pub struct Pipeline {
    locator: Box<dyn FaceLocator + Send>,
    extractor: Box<dyn DescriptorExtractor + Send>,
    metric: Metric,
    thresholds: ThresholdBook,
}

impl Pipeline {
    pub fn new(
        locator: Box<dyn FaceLocator + Send>,
        extractor: Box<dyn DescriptorExtractor + Send>,
        metric: Metric,
        thresholds: ThresholdBook,
    ) -> Self {
        Self {
            locator,
            extractor,
            metric,
            thresholds,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Locate the face in a decoded image and extract its descriptor.
    /// `Ok(None)` means no face cleared the detection threshold.
    pub fn describe_image(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Option<Descriptor>, ExtractError> {
        let region = match self.locator.locate(image) {
            Ok(Some(region)) => region,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ExtractError::InferenceFailed(e.to_string())),
        };

        tracing::debug!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            confidence = region.confidence,
            "face located"
        );

        self.extractor.extract(image, &region).map(Some)
    }

    /// Describe the face in an image file. Decode failures surface as
    /// errors so benchmark loading can report them loudly.
    pub fn describe_path(&mut self, path: &Path) -> Result<Option<Descriptor>, ExtractError> {
        let image = image::open(path)
            .map_err(|e| ExtractError::Decode(format!("{}: {e}", path.display())))?;
        self.describe_image(&image)
    }

    /// Compare one decoded image against every benchmark entry.
    pub fn compare_image(
        &mut self,
        image: &DynamicImage,
        benchmarks: &BenchmarkSet,
    ) -> Result<ComparisonResult, MatchError> {
        if benchmarks.is_empty() {
            return Err(MatchError::NoBenchmarks);
        }

        let descriptor = match self.describe_image(image) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return Ok(ComparisonResult::Unrated(UnratedReason::NoFace)),
            Err(ExtractError::EmptyRegion) => {
                return Ok(ComparisonResult::Unrated(UnratedReason::EmptyRegion))
            }
            Err(ExtractError::Decode(msg)) => {
                return Ok(ComparisonResult::Unrated(UnratedReason::Decode(msg)))
            }
            Err(e) => return Ok(ComparisonResult::Unrated(UnratedReason::Extractor(e.to_string()))),
        };

        let mut similarities = Vec::with_capacity(benchmarks.len());
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in benchmarks.entries().iter().enumerate() {
            // Tag mismatches here are a caller configuration error and
            // abort the comparison; they are never downgraded.
            let similarity = score(&descriptor, &entry.descriptor, self.metric)?;
            similarities.push((entry.label.clone(), similarity));
            if best.map(|(_, s)| similarity > s).unwrap_or(true) {
                best = Some((i, similarity));
            }
        }

        // Non-empty set, so a best entry always exists.
        let (best_idx, best_similarity) = best.ok_or(MatchError::NoBenchmarks)?;
        let rating = self
            .thresholds
            .quantize(best_similarity, descriptor.tag(), self.metric);

        Ok(ComparisonResult::Rated(MatchReport {
            rating,
            best_similarity,
            best_match: benchmarks.entries()[best_idx].label.clone(),
            similarities,
        }))
    }

    /// Compare one image file, downgrading decode failures to an unrated
    /// result (noisy input data, not a caller error).
    pub fn compare_path(
        &mut self,
        path: &Path,
        benchmarks: &BenchmarkSet,
    ) -> Result<ComparisonResult, MatchError> {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "image decode failed");
                return Ok(ComparisonResult::Unrated(UnratedReason::Decode(e.to_string())));
            }
        };
        self.compare_image(&image, benchmarks)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::detector::LocateError;
    use crate::handcrafted::HandcraftedExtractor;
    use crate::types::FaceRegion;
    use image::RgbImage;

    /// Locator stub: reports the whole image as the face, or nothing.
    pub struct StubLocator {
        pub find_face: bool,
    }

    impl FaceLocator for StubLocator {
        fn locate(&mut self, image: &DynamicImage) -> Result<Option<FaceRegion>, LocateError> {
            if !self.find_face {
                return Ok(None);
            }
            Ok(Some(FaceRegion {
                x: 0,
                y: 0,
                width: image.width(),
                height: image.height(),
                confidence: 0.95,
            }))
        }
    }

    pub fn handcrafted_pipeline(find_face: bool) -> Pipeline {
        Pipeline::new(
            Box::new(StubLocator { find_face }),
            Box::new(HandcraftedExtractor::new()),
            Metric::Cosine,
            ThresholdBook::builtin(),
        )
    }

    /// Deterministic synthetic "face" image; `seed` varies the texture.
    pub fn synthetic_image(seed: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(96, 96, |x, y| {
            image::Rgb([
                ((x * 2 + y + seed * 17) % 256) as u8,
                ((x + y * 3 + seed * 41) % 256) as u8,
                ((x * y + seed * 7) % 251) as u8,
            ])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::DescriptorTag;

    #[test]
    fn test_no_face_is_unrated_with_no_similarities() {
        let mut pipeline = handcrafted_pipeline(false);
        let mut benchmarks = BenchmarkSet::new();
        let image = synthetic_image(1);

        // Seed the set via a face-finding pipeline first.
        let mut seeder = handcrafted_pipeline(true);
        let descriptor = seeder.describe_image(&image).unwrap().unwrap();
        benchmarks.add("ref", descriptor).unwrap();

        let result = pipeline.compare_image(&image, &benchmarks).unwrap();
        assert!(matches!(
            result,
            ComparisonResult::Unrated(UnratedReason::NoFace)
        ));
        assert_eq!(result.rating(), 0);
    }

    #[test]
    fn test_self_match_rates_high() {
        let mut pipeline = handcrafted_pipeline(true);
        let image = synthetic_image(3);

        let descriptor = pipeline.describe_image(&image).unwrap().unwrap();
        let mut benchmarks = BenchmarkSet::new();
        benchmarks.add("self", descriptor).unwrap();

        let result = pipeline.compare_image(&image, &benchmarks).unwrap();
        let ComparisonResult::Rated(report) = result else {
            panic!("expected a rated result");
        };
        assert!(report.rating >= 4, "rating = {}", report.rating);
        assert!(report.best_similarity > 0.99);
        assert_eq!(report.best_match, "self");
        assert_eq!(report.similarities.len(), 1);
    }

    #[test]
    fn test_empty_benchmark_set_refused() {
        let mut pipeline = handcrafted_pipeline(true);
        let benchmarks = BenchmarkSet::new();
        let image = synthetic_image(1);
        assert!(matches!(
            pipeline.compare_image(&image, &benchmarks),
            Err(MatchError::NoBenchmarks)
        ));
    }

    #[test]
    fn test_best_match_among_several_entries() {
        let mut pipeline = handcrafted_pipeline(true);
        let query = synthetic_image(5);

        let mut benchmarks = BenchmarkSet::new();
        for (label, seed) in [("other-a", 11), ("target", 5), ("other-b", 29)] {
            let descriptor = pipeline
                .describe_image(&synthetic_image(seed))
                .unwrap()
                .unwrap();
            benchmarks.add(label, descriptor).unwrap();
        }

        let result = pipeline.compare_image(&query, &benchmarks).unwrap();
        let ComparisonResult::Rated(report) = result else {
            panic!("expected a rated result");
        };
        assert_eq!(report.best_match, "target");
        assert_eq!(report.similarities.len(), 3);
        let target_sim = report
            .similarities
            .iter()
            .find(|(label, _)| label == "target")
            .unwrap()
            .1;
        assert!((target_sim - report.best_similarity).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_tags_abort_comparison() {
        let mut pipeline = handcrafted_pipeline(true);
        let image = synthetic_image(2);

        let mut benchmarks = BenchmarkSet::new();
        benchmarks
            .add(
                "wrong-strategy",
                Descriptor::new(DescriptorTag::Embedding("Facenet".into()), vec![1.0, 0.0]),
            )
            .unwrap();

        assert!(matches!(
            pipeline.compare_image(&image, &benchmarks),
            Err(MatchError::IncompatibleDescriptors { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_downgrades_to_unrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();

        let mut pipeline = handcrafted_pipeline(true);
        let mut benchmarks = BenchmarkSet::new();
        let descriptor = pipeline
            .describe_image(&synthetic_image(1))
            .unwrap()
            .unwrap();
        benchmarks.add("ref", descriptor).unwrap();

        let result = pipeline.compare_path(&path, &benchmarks).unwrap();
        assert!(matches!(
            result,
            ComparisonResult::Unrated(UnratedReason::Decode(_))
        ));
    }
}
