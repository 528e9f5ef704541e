//! Similarity-to-stars quantization.
//!
//! Raw similarity ranges differ per extraction strategy and metric (a
//! stricter embedding model needs higher cosine cutoffs for the same
//! perceptual confidence), so calibration lives in per-(strategy, metric)
//! threshold tables — data, not branching logic. Tables can be overridden
//! from a TOML document.

use crate::similarity::Metric;
use crate::types::DescriptorTag;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("failed to parse thresholds document: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown strategy {0:?} (expected \"handcrafted\" or \"embedding:<model>\")")]
    UnknownStrategy(String),
    #[error("invalid threshold table for {strategy}/{metric}: {reason}")]
    InvalidTable {
        strategy: String,
        metric: Metric,
        reason: String,
    },
}

/// Ordered (lower bound, stars) rows, descending. A similarity quantizes
/// to the stars of the first row whose bound it exceeds, else to 1 star.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    rows: Vec<(f32, u8)>,
}

impl ThresholdTable {
    /// Validate and build a table. Rows must be strictly descending in
    /// both bound and stars, with stars in 2..=5 — 1 star is the implicit
    /// floor for any legitimate score below every bound.
    pub fn new(rows: Vec<(f32, u8)>) -> Result<Self, String> {
        if rows.is_empty() {
            return Err("table has no rows".to_string());
        }
        for window in rows.windows(2) {
            let (hi, lo) = (window[0], window[1]);
            if hi.0 <= lo.0 {
                return Err(format!("bounds not descending: {} then {}", hi.0, lo.0));
            }
            if hi.1 <= lo.1 {
                return Err(format!("stars not descending: {} then {}", hi.1, lo.1));
            }
        }
        for &(bound, stars) in &rows {
            if !(MIN_RATING + 1..=MAX_RATING).contains(&stars) {
                return Err(format!("stars {stars} out of range 2..=5"));
            }
            if !bound.is_finite() {
                return Err(format!("non-finite bound {bound}"));
            }
        }
        Ok(Self { rows })
    }

    /// Quantize a similarity to 1..=5 stars. Monotonic by construction.
    pub fn quantize(&self, similarity: f32) -> u8 {
        for &(bound, stars) in &self.rows {
            if similarity > bound {
                return stars;
            }
        }
        MIN_RATING
    }
}

/// All calibration tables, keyed by (strategy tag, metric), with a generic
/// fallback for (strategy, metric) pairs that have no dedicated row.
#[derive(Debug, Clone)]
pub struct ThresholdBook {
    tables: HashMap<(DescriptorTag, Metric), ThresholdTable>,
    fallback: ThresholdTable,
}

impl ThresholdBook {
    /// Calibration shipped with the engine, tuned on the production photo
    /// corpus per model.
    pub fn builtin() -> Self {
        let table = |rows: &[(f32, u8)]| {
            // Static data validated at construction; rows are literals.
            ThresholdTable::new(rows.to_vec()).expect("builtin threshold table is valid")
        };

        let mut tables = HashMap::new();
        tables.insert(
            (DescriptorTag::Handcrafted, Metric::Cosine),
            table(&[(0.75, 5), (0.68, 4), (0.60, 3), (0.52, 2)]),
        );
        tables.insert(
            (DescriptorTag::Handcrafted, Metric::Correlation),
            table(&[(0.85, 5), (0.75, 4), (0.65, 3), (0.55, 2)]),
        );
        tables.insert(
            (DescriptorTag::Embedding("Facenet".into()), Metric::Cosine),
            table(&[(0.80, 5), (0.70, 4), (0.60, 3), (0.50, 2)]),
        );
        tables.insert(
            (DescriptorTag::Embedding("ArcFace".into()), Metric::Cosine),
            table(&[(0.85, 5), (0.75, 4), (0.65, 3), (0.55, 2)]),
        );

        Self {
            tables,
            fallback: table(&[(0.75, 5), (0.65, 4), (0.55, 3), (0.45, 2)]),
        }
    }

    /// Load the builtin book, then apply overrides/additions from a TOML
    /// document:
    ///
    /// ```toml
    /// [[table]]
    /// strategy = "embedding:SFace"
    /// metric = "cosine"
    /// rows = [[0.82, 5], [0.72, 4], [0.62, 3], [0.52, 2]]
    /// ```
    pub fn from_toml_str(doc: &str) -> Result<Self, ThresholdError> {
        #[derive(Deserialize)]
        struct BookConfig {
            #[serde(default)]
            table: Vec<TableConfig>,
        }

        #[derive(Deserialize)]
        struct TableConfig {
            strategy: String,
            metric: Metric,
            rows: Vec<(f32, u8)>,
        }

        let config: BookConfig = toml::from_str(doc)?;
        let mut book = Self::builtin();

        for entry in config.table {
            let tag = DescriptorTag::parse(&entry.strategy)
                .ok_or_else(|| ThresholdError::UnknownStrategy(entry.strategy.clone()))?;
            let table =
                ThresholdTable::new(entry.rows).map_err(|reason| ThresholdError::InvalidTable {
                    strategy: entry.strategy.clone(),
                    metric: entry.metric,
                    reason,
                })?;
            book.tables.insert((tag, entry.metric), table);
        }

        Ok(book)
    }

    /// Quantize a best-match similarity to 1..=5 stars for the strategy
    /// and metric that produced it. Rating 0 is never produced here; it is
    /// the unrated marker set upstream when no valid score exists.
    pub fn quantize(&self, similarity: f32, tag: &DescriptorTag, metric: Metric) -> u8 {
        self.lookup(tag, metric).quantize(similarity)
    }

    fn lookup(&self, tag: &DescriptorTag, metric: Metric) -> &ThresholdTable {
        self.tables
            .get(&(tag.clone(), metric))
            .unwrap_or(&self.fallback)
    }
}

impl Default for ThresholdBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facenet() -> DescriptorTag {
        DescriptorTag::Embedding("Facenet".into())
    }

    #[test]
    fn test_builtin_handcrafted_cosine_cutoffs() {
        let book = ThresholdBook::builtin();
        let tag = DescriptorTag::Handcrafted;
        assert_eq!(book.quantize(0.90, &tag, Metric::Cosine), 5);
        assert_eq!(book.quantize(0.70, &tag, Metric::Cosine), 4);
        assert_eq!(book.quantize(0.61, &tag, Metric::Cosine), 3);
        assert_eq!(book.quantize(0.53, &tag, Metric::Cosine), 2);
        assert_eq!(book.quantize(0.10, &tag, Metric::Cosine), 1);
    }

    #[test]
    fn test_per_model_calibration_differs() {
        // The same similarity rates differently under a stricter model.
        let book = ThresholdBook::builtin();
        let similarity = 0.82;
        assert_eq!(book.quantize(similarity, &facenet(), Metric::Cosine), 5);
        let arcface = DescriptorTag::Embedding("ArcFace".into());
        assert_eq!(book.quantize(similarity, &arcface, Metric::Cosine), 4);
    }

    #[test]
    fn test_unknown_model_uses_fallback() {
        let book = ThresholdBook::builtin();
        let tag = DescriptorTag::Embedding("SFace".into());
        assert_eq!(book.quantize(0.76, &tag, Metric::Cosine), 5);
        assert_eq!(book.quantize(0.50, &tag, Metric::EuclideanL2), 2);
    }

    #[test]
    fn test_quantize_is_monotonic() {
        let book = ThresholdBook::builtin();
        let tag = DescriptorTag::Handcrafted;
        let mut previous = 0u8;
        let mut s = -1.0f32;
        while s <= 1.0 {
            let rating = book.quantize(s, &tag, Metric::Cosine);
            assert!(
                rating >= previous,
                "rating dropped from {previous} to {rating} at similarity {s}"
            );
            previous = rating;
            s += 0.001;
        }
    }

    #[test]
    fn test_quantize_never_returns_zero() {
        let book = ThresholdBook::builtin();
        for s in [-1.0f32, 0.0, 0.3, 0.99, 1.0] {
            let rating = book.quantize(s, &DescriptorTag::Handcrafted, Metric::Cosine);
            assert!((MIN_RATING..=MAX_RATING).contains(&rating));
        }
    }

    #[test]
    fn test_toml_override_and_addition() {
        let doc = r#"
            [[table]]
            strategy = "embedding:SFace"
            metric = "cosine"
            rows = [[0.82, 5], [0.72, 4], [0.62, 3], [0.52, 2]]

            [[table]]
            strategy = "handcrafted"
            metric = "cosine"
            rows = [[0.90, 5], [0.80, 4], [0.70, 3], [0.60, 2]]
        "#;
        let book = ThresholdBook::from_toml_str(doc).unwrap();

        // New model table is honored instead of the fallback.
        let sface = DescriptorTag::Embedding("SFace".into());
        assert_eq!(book.quantize(0.83, &sface, Metric::Cosine), 5);
        assert_eq!(book.quantize(0.76, &sface, Metric::Cosine), 4);

        // Override replaces the builtin handcrafted/cosine table.
        assert_eq!(book.quantize(0.85, &DescriptorTag::Handcrafted, Metric::Cosine), 4);

        // Untouched tables remain builtin.
        assert_eq!(book.quantize(0.86, &DescriptorTag::Handcrafted, Metric::Correlation), 5);
    }

    #[test]
    fn test_toml_rejects_non_monotonic_rows() {
        let doc = r#"
            [[table]]
            strategy = "handcrafted"
            metric = "cosine"
            rows = [[0.60, 5], [0.80, 4]]
        "#;
        assert!(matches!(
            ThresholdBook::from_toml_str(doc),
            Err(ThresholdError::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_toml_rejects_unknown_strategy() {
        let doc = r#"
            [[table]]
            strategy = "hog"
            metric = "cosine"
            rows = [[0.80, 5], [0.70, 4]]
        "#;
        assert!(matches!(
            ThresholdBook::from_toml_str(doc),
            Err(ThresholdError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_table_rejects_bad_stars() {
        assert!(ThresholdTable::new(vec![(0.8, 6), (0.6, 4)]).is_err());
        assert!(ThresholdTable::new(vec![(0.8, 5), (0.6, 1)]).is_err());
        assert!(ThresholdTable::new(vec![]).is_err());
    }
}
