// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process vector index backed by a `Vec`.

use std::collections::HashSet;

use super::{check_dimension, check_k, cosine_similarity, top_k, EmbeddedChunk, RetrievalResult, VectorIndex};
use crate::errors::Result;

/// Linear-scan index owning its entries.
///
/// Built once per run, then read-only while serving queries.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Vec<EmbeddedChunk>,
    fingerprints: HashSet<String>,
    dimension: Option<usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index whose dimension is fixed up front.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[EmbeddedChunk] {
        &self.entries
    }
}

impl VectorIndex for MemoryIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn insert(&mut self, entry: EmbeddedChunk) -> Result<()> {
        check_dimension(self.dimension, &entry.vector, "insert")?;
        self.dimension = Some(entry.vector.len());
        self.fingerprints.insert(entry.chunk.fingerprint());
        self.entries.push(entry);
        Ok(())
    }

    fn contains(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.fingerprints.contains(fingerprint))
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        check_k(k)?;
        check_dimension(self.dimension, vector, "query")?;

        let scores = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(vector, &entry.vector)));

        Ok(top_k(scores, k)
            .into_iter()
            .map(|(position, score)| RetrievalResult {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.fingerprints.clear();
        self.dimension = None;
        Ok(())
    }

    fn replace_all(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        let dimension = entries.first().map(|first| first.vector.len());
        for entry in &entries {
            check_dimension(dimension, &entry.vector, "replace")?;
        }

        self.fingerprints = entries.iter().map(|e| e.chunk.fingerprint()).collect();
        self.entries = entries;
        self.dimension = dimension;
        Ok(())
    }
}
