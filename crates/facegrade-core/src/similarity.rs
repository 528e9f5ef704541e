//! Similarity metrics over descriptors.
//!
//! All metrics are deterministic pure functions returning "higher = more
//! similar" scalars. Comparing descriptors with different tags is a typed
//! error, never a silent numeric result.

use crate::types::{Descriptor, MatchError};
use serde::{Deserialize, Serialize};

/// Guards the cosine denominator.
const COSINE_EPSILON: f32 = 1e-7;
/// Empirical upper bound on raw Euclidean distance between face
/// embeddings; distances are mapped through `1 - min(d / D, 1)`.
const EUCLIDEAN_NORM_DISTANCE: f32 = 1.5;
/// Two unit vectors are at most distance 2 apart.
const EUCLIDEAN_L2_NORM_DISTANCE: f32 = 2.0;
/// Guards the per-input L2 normalization of `euclidean_l2`.
const NORM_EPSILON: f32 = 1e-7;

/// Selectable comparison metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cosine,
    Euclidean,
    EuclideanL2,
    /// Pearson histogram correlation; meaningful for the handcrafted
    /// histogram descriptor.
    Correlation,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::EuclideanL2 => "euclidean_l2",
            Self::Correlation => "correlation",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "euclidean_l2" => Ok(Self::EuclideanL2),
            "correlation" => Ok(Self::Correlation),
            other => Err(format!(
                "unknown metric {other:?} (expected cosine, euclidean, euclidean_l2 or correlation)"
            )),
        }
    }
}

/// Compute the similarity between two descriptors of the same tag.
pub fn score(a: &Descriptor, b: &Descriptor, metric: Metric) -> Result<f32, MatchError> {
    if a.tag() != b.tag() {
        return Err(MatchError::IncompatibleDescriptors {
            left: a.tag().clone(),
            right: b.tag().clone(),
        });
    }

    let a = a.values();
    let b = b.values();

    let value = match metric {
        Metric::Cosine => cosine(a, b),
        Metric::Euclidean => distance_similarity(euclidean_distance(a, b), EUCLIDEAN_NORM_DISTANCE),
        Metric::EuclideanL2 => {
            let an = normalized(a);
            let bn = normalized(b);
            distance_similarity(euclidean_distance(&an, &bn), EUCLIDEAN_L2_NORM_DISTANCE)
        }
        Metric::Correlation => correlation(a, b),
    };

    Ok(value)
}

/// Cosine similarity in [-1, 1].
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Map a distance into a [0, 1] similarity: identical inputs score 1,
/// anything at or beyond `max_distance` scores 0.
fn distance_similarity(distance: f32, max_distance: f32) -> f32 {
    (1.0 - (distance / max_distance).min(1.0)).max(0.0)
}

fn normalized(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt() + NORM_EPSILON;
    values.iter().map(|v| v / norm).collect()
}

/// Pearson correlation coefficient over histogram bins, in [-1, 1].
fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let mean_a: f32 = a[..n].iter().sum::<f32>() / n as f32;
    let mean_b: f32 = b[..n].iter().sum::<f32>() / n as f32;

    let mut cov = 0.0f32;
    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;

    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}
