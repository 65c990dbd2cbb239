// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index - exact cosine-similarity search over embedded chunks.
//!
//! Two implementations share the [`VectorIndex`] contract: [`MemoryIndex`]
//! for a single ingest-then-serve run and [`SqliteIndex`] when the index
//! must persist between runs. Both scan every entry per query.

pub mod memory;
pub mod sqlite;

use serde::Serialize;

use crate::embedding::Chunk;
use crate::errors::{RagError, Result};

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// A chunk with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }
}

/// One ranked hit from [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Storage and k-nearest-neighbour search over embedded chunks.
///
/// Every vector in one index has the same length; the first insert fixes it.
pub trait VectorIndex {
    /// Fixed vector length, or `None` while the index is empty and unbound.
    fn dimension(&self) -> Option<usize>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize>;

    /// Appends one entry. Never deduplicates.
    fn insert(&mut self, entry: EmbeddedChunk) -> Result<()>;

    /// Appends entries in order.
    fn insert_many(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        for entry in entries {
            self.insert(entry)?;
        }
        Ok(())
    }

    /// True when an entry with this chunk fingerprint is stored.
    fn contains(&self, fingerprint: &str) -> Result<bool>;

    /// Returns up to `k` entries by descending cosine similarity.
    ///
    /// Ties keep insertion order. Entries whose similarity is undefined
    /// (zero-magnitude vectors) are never returned.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// Removes every entry and unbinds the dimension.
    fn clear(&mut self) -> Result<()>;

    /// Replaces the whole contents with `entries`, in order.
    ///
    /// The dimension is rebound to the new entries. On error the previous
    /// contents are kept.
    fn replace_all(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()>;
}

/// Cosine similarity of two vectors.
///
/// Returns `None` when the lengths differ, either vector is empty or has zero
/// magnitude, or the result is not finite. The value is clamped to `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return None;
    }

    let score = dot_product / (magnitude_a * magnitude_b);
    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}

/// Checks a vector against the index dimension for the named operation.
pub(crate) fn check_dimension(
    dimension: Option<usize>,
    vector: &[f32],
    operation: &'static str,
) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::InvalidParameter(format!(
            "{} vector must not be empty",
            operation
        )));
    }
    match dimension {
        Some(expected) if expected != vector.len() => Err(RagError::DimensionMismatch {
            operation,
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::InvalidParameter(
            "k must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Picks the `k` best `(position, score)` pairs in insertion order of `scores`.
///
/// `None` scores are dropped. Equal scores keep the earlier position first.
pub(crate) fn top_k<I>(scores: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (usize, Option<f32>)>,
{
    let mut ranked: Vec<(usize, f32)> = scores
        .into_iter()
        .filter_map(|(position, score)| score.map(|s| (position, s)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cosine_of_parallel_and_opposite_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]), Some(-1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 5.0]), Some(0.0));
    }

    #[test]
    fn cosine_sentinel_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn top_k_breaks_ties_by_position() {
        let ranked = top_k(
            vec![(0, Some(0.5)), (1, Some(0.9)), (2, None), (3, Some(0.5)), (4, Some(0.1))],
            3,
        );
        assert_eq!(ranked, vec![(1, 0.9), (0, 0.5), (3, 0.5)]);
    }

    #[test]
    fn check_k_rejects_zero() {
        assert!(matches!(check_k(0), Err(RagError::InvalidParameter(_))));
        assert!(check_k(1).is_ok());
    }

    fn vector_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1usize..32).prop_flat_map(|len| {
            (
                prop::collection::vec(-1000.0f32..1000.0, len),
                prop::collection::vec(-1000.0f32..1000.0, len),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_cosine_is_symmetric_and_bounded((a, b) in vector_pair()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert_eq!(ab, ba);
            if let Some(score) = ab {
                prop_assert!((-1.0..=1.0).contains(&score));
            }
        }
    }
}
