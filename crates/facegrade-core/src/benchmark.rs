//! Reference-face collection.
//!
//! A `BenchmarkSet` is the comparison target for every query: an
//! insertion-ordered list of labeled descriptors, all produced by one
//! extraction strategy. The first successful add fixes the set's tag;
//! mixing strategies is rejected, never silently coerced.

use crate::types::{BenchmarkEntry, Descriptor, DescriptorTag, MatchError};

#[derive(Debug, Default, Clone)]
pub struct BenchmarkSet {
    entries: Vec<BenchmarkEntry>,
}

impl BenchmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference descriptor under `label`. Labels need not be
    /// unique. Fails with [`MatchError::TagMismatch`] when the descriptor
    /// was produced by a different strategy than the set already holds.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        descriptor: Descriptor,
    ) -> Result<(), MatchError> {
        if let Some(expected) = self.tag() {
            if expected != descriptor.tag() {
                return Err(MatchError::TagMismatch {
                    expected: expected.clone(),
                    got: descriptor.tag().clone(),
                });
            }
        }

        let label = label.into();
        tracing::debug!(label = %label, tag = %descriptor.tag(), "benchmark added");
        self.entries.push(BenchmarkEntry { label, descriptor });
        Ok(())
    }

    /// Empty the set and release its tag constraint.
    pub fn clear(&mut self) {
        self.entries.clear();
        tracing::debug!("all benchmarks cleared");
    }

    /// Remove one entry by insertion index.
    pub fn remove(&mut self, index: usize) -> Option<BenchmarkEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Tag shared by every entry, or `None` while the set is empty.
    pub fn tag(&self) -> Option<&DescriptorTag> {
        self.entries.first().map(|e| e.descriptor.tag())
    }

    pub fn entries(&self) -> &[BenchmarkEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
