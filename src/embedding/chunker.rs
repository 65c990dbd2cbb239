// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Text is split recursively on a prioritized list of separators until every
//! piece fits the window stride, then the pieces are merged into windows of
//! at most `chunk_size` characters. Consecutive windows share exactly
//! `chunk_overlap` characters. All lengths count `char`s, not bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{RagError, Result};
use crate::records::Record;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Separators tried in priority order. The empty separator means hard slicing.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// Configuration for the text splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidParameter(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidParameter(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Distance the window advances when it is full.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// A bounded slice of a record, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text (never empty or whitespace-only).
    pub content: String,
    /// Id of the record this chunk came from.
    pub source_id: String,
    /// Position of the chunk within its record.
    pub ordinal: usize,
    /// Metadata copied from the record.
    pub metadata: BTreeMap<String, Value>,
}

impl Chunk {
    /// Stable identity over source, position and content.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(self.ordinal as u64).to_le_bytes());
        hasher.update(&[0]);
        hasher.update(self.content.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    /// Creates a new splitter with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a splitter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Splits text into overlapping chunks.
    ///
    /// ```text
    /// pieces = recursive split of text, each piece <= stride chars
    /// start = 0
    /// loop:
    ///   end = last piece boundary in (start + overlap, start + size]
    ///         (or start + size if none, or text end if within reach)
    ///   emit text[start..end] unless it is whitespace-only
    ///   stop if end == text end
    ///   start = end - overlap
    /// ```
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut boundaries = Vec::new();
        let mut total = 0_usize;
        for piece in split_recursive(text, SEPARATORS, self.config.stride()) {
            total += piece.chars().count();
            boundaries.push(total);
        }

        // Byte offset of every char position, including the end of text.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut chunks = Vec::new();
        let mut start = 0_usize;
        loop {
            let end = self.window_end(text, &offsets, &boundaries, start, total);
            let window = &text[offsets[start]..offsets[end]];
            if !window.trim().is_empty() {
                chunks.push(window.to_string());
            }
            if end >= total {
                break;
            }
            start = end - self.config.chunk_overlap;
        }

        chunks
    }

    /// Splits a record's content and attaches its identity and metadata.
    pub fn chunk_record(&self, record: &Record) -> Vec<Chunk> {
        let metadata = record.metadata();
        self.split_text(&record.content())
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| Chunk {
                content,
                source_id: record.id.clone(),
                ordinal,
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Chunks every record, preserving record order.
    pub fn chunk_records(&self, records: &[Record]) -> Vec<Chunk> {
        records
            .iter()
            .flat_map(|record| self.chunk_record(record))
            .collect()
    }

    fn window_end(
        &self,
        text: &str,
        offsets: &[usize],
        boundaries: &[usize],
        start: usize,
        total: usize,
    ) -> usize {
        let limit = start + self.config.chunk_size;
        if limit >= total {
            return total;
        }

        let floor = start + self.config.chunk_overlap;
        let below = boundaries.partition_point(|&b| b <= limit);
        match below.checked_sub(1).map(|idx| boundaries[idx]) {
            Some(boundary)
                if boundary > floor
                    && !text[offsets[start]..offsets[boundary]].trim().is_empty() =>
            {
                boundary
            }
            _ => limit,
        }
    }
}

/// Splits `text` with the contract's free-function signature.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    let config = ChunkConfig::new(chunk_size, chunk_overlap)?;
    Ok(TextSplitter::new(config).split_text(text))
}

fn split_recursive<'a>(text: &'a str, separators: &[&str], budget: usize) -> Vec<&'a str> {
    if text.chars().count() <= budget {
        return vec![text];
    }

    let found = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep));

    match found {
        Some((idx, sep)) if !sep.is_empty() => {
            let remaining = &separators[idx + 1..];
            let mut pieces = Vec::new();
            for piece in text.split_inclusive(*sep) {
                if piece.chars().count() <= budget {
                    pieces.push(piece);
                } else {
                    pieces.extend(split_recursive(piece, remaining, budget));
                }
            }
            pieces
        }
        _ => hard_slice(text, budget),
    }
}

fn hard_slice(text: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0_usize;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % budget == 0 {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
