// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retriever - projects index hits down to chunks for prompt assembly.

use crate::embedding::Chunk;
use crate::errors::Result;
use crate::index::{RetrievalResult, VectorIndex};

/// Thin read-only view over a [`VectorIndex`].
pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn VectorIndex) -> Self {
        Self { index }
    }

    /// Top `k` chunks for `query_vector`, most similar first.
    pub fn retrieve(&self, query_vector: &[f32], k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(query_vector, k)?
            .into_iter()
            .map(|result| result.chunk)
            .collect())
    }

    /// Same as [`Retriever::retrieve`] but keeps the similarity scores.
    pub fn retrieve_scored(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let results = self.index.query(query_vector, k)?;
        tracing::debug!("retrieved {} of at most {} chunks", results.len(), k);
        Ok(results)
    }
}
