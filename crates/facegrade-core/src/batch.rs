//! Batch comparison driver.
//!
//! Runs the pipeline once per image, reports progress after every item and
//! honors cooperative cancellation at item granularity. A per-image fault
//! degrades that image's entry to an unrated result; it never aborts the
//! batch.

use crate::benchmark::BenchmarkSet;
use crate::pipeline::Pipeline;
use crate::types::{ComparisonResult, MatchError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback: (1-based index, total, current item name). Invoked
/// on the batch-driving thread after each item completes; treat it as
/// potentially UI-affecting and keep it cheap.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// Compare every image against the benchmark set.
///
/// The set is borrowed immutably for the whole run. Cancellation is
/// checked before each item starts; once signaled, the partial map
/// accumulated so far is returned — never a half-written entry for an
/// in-flight item. Fails upfront with [`MatchError::NoBenchmarks`] when
/// the set is empty.
pub fn run_batch(
    paths: &[PathBuf],
    benchmarks: &BenchmarkSet,
    pipeline: &mut Pipeline,
    on_progress: &mut ProgressFn<'_>,
    cancel: &AtomicBool,
) -> Result<BTreeMap<PathBuf, ComparisonResult>, MatchError> {
    if benchmarks.is_empty() {
        return Err(MatchError::NoBenchmarks);
    }

    let total = paths.len();
    let mut results = BTreeMap::new();

    for (i, path) in paths.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(completed = i, total, "batch cancelled");
            break;
        }

        let result = pipeline.compare_path(path, benchmarks)?;

        match &result {
            ComparisonResult::Rated(report) => tracing::info!(
                path = %path.display(),
                rating = report.rating,
                similarity = report.best_similarity,
                best_match = %report.best_match,
                "image rated"
            ),
            ComparisonResult::Unrated(reason) => tracing::warn!(
                path = %path.display(),
                reason = %reason,
                "image left unrated"
            ),
        }

        results.insert(path.clone(), result);
        on_progress(i + 1, total, &item_name(path));
    }

    Ok(results)
}

fn item_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{handcrafted_pipeline, synthetic_image};
    use crate::types::UnratedReason;
    use std::sync::atomic::AtomicUsize;

    fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img-{i:02}.png"));
                synthetic_image(i as u32).save(&path).unwrap();
                path
            })
            .collect()
    }

    fn seeded_benchmarks(pipeline: &mut Pipeline) -> BenchmarkSet {
        let mut set = BenchmarkSet::new();
        let descriptor = pipeline
            .describe_image(&synthetic_image(0))
            .unwrap()
            .unwrap();
        set.add("ref", descriptor).unwrap();
        set
    }

    #[test]
    fn test_batch_tolerates_corrupt_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_images(dir.path(), 10);
        // Replace item #5 with garbage bytes.
        std::fs::write(&paths[4], b"not an image at all").unwrap();

        let mut pipeline = handcrafted_pipeline(true);
        let benchmarks = seeded_benchmarks(&mut pipeline);

        let mut progress_calls = 0usize;
        let cancel = AtomicBool::new(false);
        let results = run_batch(
            &paths,
            &benchmarks,
            &mut pipeline,
            &mut |_, total, _| {
                progress_calls += 1;
                assert_eq!(total, 10);
            },
            &cancel,
        )
        .unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(progress_calls, 10);

        let corrupt = paths.remove(4);
        assert!(matches!(
            results[&corrupt],
            ComparisonResult::Unrated(UnratedReason::Decode(_))
        ));
        for path in &paths {
            assert!(results[path].is_rated(), "{} should be rated", path.display());
        }
    }

    #[test]
    fn test_batch_empty_set_refused() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 2);
        let mut pipeline = handcrafted_pipeline(true);
        let cancel = AtomicBool::new(false);

        let result = run_batch(
            &paths,
            &BenchmarkSet::new(),
            &mut pipeline,
            &mut |_, _, _| {},
            &cancel,
        );
        assert!(matches!(result, Err(MatchError::NoBenchmarks)));
    }

    #[test]
    fn test_cancellation_returns_partial_map() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 10);

        let mut pipeline = handcrafted_pipeline(true);
        let benchmarks = seeded_benchmarks(&mut pipeline);

        let cancel = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);
        let results = run_batch(
            &paths,
            &benchmarks,
            &mut pipeline,
            &mut |index, _, _| {
                completed.store(index, Ordering::Relaxed);
                if index == 3 {
                    cancel.store(true, Ordering::Relaxed);
                }
            },
            &cancel,
        )
        .unwrap();

        // Exactly items 1-3; no partial entry for item 4.
        assert_eq!(completed.load(Ordering::Relaxed), 3);
        assert_eq!(results.len(), 3);
        for path in &paths[..3] {
            assert!(results.contains_key(path));
        }
        assert!(!results.contains_key(&paths[3]));
    }

    #[test]
    fn test_progress_reports_item_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 3);

        let mut pipeline = handcrafted_pipeline(true);
        let benchmarks = seeded_benchmarks(&mut pipeline);

        let mut seen = Vec::new();
        let cancel = AtomicBool::new(false);
        run_batch(
            &paths,
            &benchmarks,
            &mut pipeline,
            &mut |index, total, name| seen.push((index, total, name.to_string())),
            &cancel,
        )
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (1, 3, "img-00.png".to_string()),
                (2, 3, "img-01.png".to_string()),
                (3, 3, "img-02.png".to_string()),
            ]
        );
    }

    #[test]
    fn test_no_face_items_are_unrated_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 2);

        // Locator that never finds a face; benchmarks seeded separately.
        let mut seeder = handcrafted_pipeline(true);
        let benchmarks = seeded_benchmarks(&mut seeder);
        let mut pipeline = handcrafted_pipeline(false);

        let cancel = AtomicBool::new(false);
        let results = run_batch(
            &paths,
            &benchmarks,
            &mut pipeline,
            &mut |_, _, _| {},
            &cancel,
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        for result in results.values() {
            assert!(matches!(
                result,
                ComparisonResult::Unrated(UnratedReason::NoFace)
            ));
            assert_eq!(result.rating(), 0);
        }
    }
}
