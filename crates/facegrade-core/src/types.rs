use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies the extraction strategy (and, for embeddings, the specific
/// model) that produced a descriptor. Descriptors with different tags are
/// never comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorTag {
    /// Handcrafted texture + gradient + color histogram descriptor.
    Handcrafted,
    /// External embedding model, identified by model name (e.g., "Facenet").
    Embedding(String),
}

impl DescriptorTag {
    /// Parse the CLI/config form: `handcrafted` or `embedding:<model>`.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "handcrafted" {
            Some(Self::Handcrafted)
        } else {
            s.strip_prefix("embedding:")
                .filter(|m| !m.is_empty())
                .map(|m| Self::Embedding(m.to_string()))
        }
    }
}

impl std::fmt::Display for DescriptorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handcrafted => write!(f, "handcrafted"),
            Self::Embedding(model) => write!(f, "embedding:{model}"),
        }
    }
}

/// Fixed-length numeric summary of a face region, immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    tag: DescriptorTag,
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(tag: DescriptorTag, values: Vec<f32>) -> Self {
        Self { tag, values }
    }

    pub fn tag(&self) -> &DescriptorTag {
        &self.tag
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pixel-space face bounding region, already clipped to image bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// One reference face: a label plus its descriptor. Owned by a
/// [`BenchmarkSet`](crate::benchmark::BenchmarkSet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub label: String,
    pub descriptor: Descriptor,
}

/// Successful comparison payload: a 1–5 star rating plus diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    /// Star rating, always in 1..=5.
    pub rating: u8,
    pub best_similarity: f32,
    /// Label of the best-matching benchmark entry.
    pub best_match: String,
    /// Similarity against every benchmark entry, in insertion order.
    pub similarities: Vec<(String, f32)>,
}

/// Why an image could not be rated. Every variant renders as rating 0 at
/// the UI edge, but callers can tell a face-less photo from a broken one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnratedReason {
    /// No detection cleared the confidence threshold. Expected and common.
    NoFace,
    /// The clipped face region had zero area.
    EmptyRegion,
    /// The image file could not be decoded.
    Decode(String),
    /// Descriptor extraction failed for another reason.
    Extractor(String),
}

impl std::fmt::Display for UnratedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFace => write!(f, "no face detected"),
            Self::EmptyRegion => write!(f, "face region has zero area"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
            Self::Extractor(msg) => write!(f, "extraction failed: {msg}"),
        }
    }
}

/// Per-image comparison outcome. "Unrated" is a distinct variant, never a
/// sentinel rating of 0 that could be confused with a low-confidence match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComparisonResult {
    Rated(MatchReport),
    Unrated(UnratedReason),
}

impl ComparisonResult {
    /// Star rating for display: 1..=5 when rated, 0 when unrated.
    pub fn rating(&self) -> u8 {
        match self {
            Self::Rated(report) => report.rating,
            Self::Unrated(_) => 0,
        }
    }

    pub fn is_rated(&self) -> bool {
        matches!(self, Self::Rated(_))
    }
}

/// Configuration-level faults. These indicate a caller error and abort the
/// operation that triggered them; they are never downgraded to an unrated
/// per-image result.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("incompatible descriptors: {left} vs {right}")]
    IncompatibleDescriptors {
        left: DescriptorTag,
        right: DescriptorTag,
    },
    #[error("benchmark tag mismatch: set holds {expected} descriptors, got {got}")]
    TagMismatch {
        expected: DescriptorTag,
        got: DescriptorTag,
    },
    #[error("benchmark set is empty — add at least one reference face first")]
    NoBenchmarks,
}
