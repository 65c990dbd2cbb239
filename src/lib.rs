// SPDX-License-Identifier: MIT OR Apache-2.0

//! faqrag - Retrieval-augmented answers over question/answer corpora
//!
//! Records are chunked, embedded and stored in a vector index; questions are
//! embedded, matched against the index by cosine similarity, and answered by
//! a generative model constrained to the retrieved context.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod generation;
pub(crate) mod http;
pub mod index;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod retriever;
pub mod synthesizer;
pub mod utils;

pub use errors::{RagError, Result};
