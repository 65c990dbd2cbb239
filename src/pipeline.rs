// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion and query orchestration over the retrieval components.
//!
//! `ingest`: records → chunks → embeddings → index.
//! `ask`: question → embedding → top-k chunks → synthesized answer.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use serde::Serialize;

use crate::config::IngestPolicy;
use crate::embedding::{Chunk, EmbeddingProvider, TextSplitter};
use crate::errors::{RagError, Result};
use crate::index::{EmbeddedChunk, RetrievalResult, VectorIndex};
use crate::records::Record;
use crate::retriever::Retriever;
use crate::synthesizer::AnswerSynthesizer;

/// Options for [`ingest`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum embedding requests in flight.
    pub concurrency: usize,
    pub policy: IngestPolicy,
    /// Replace the index contents instead of adding to them. The old
    /// contents stay until every chunk has embedded.
    pub replace: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            policy: IngestPolicy::default(),
            replace: false,
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Chunks, embeds and indexes `records`.
///
/// Embedding requests run concurrently but results keep chunk order. The
/// index is only written after every chunk embedded successfully, so a
/// gateway failure leaves it untouched. With `replace` the policy only
/// looks at the new batch.
pub async fn ingest(
    records: &[Record],
    splitter: &TextSplitter,
    embedder: &dyn EmbeddingProvider,
    index: &mut dyn VectorIndex,
    options: &IngestOptions,
    progress: &ProgressBar,
) -> Result<IngestReport> {
    if options.concurrency == 0 {
        return Err(RagError::InvalidParameter(
            "embedding concurrency must be at least 1".to_string(),
        ));
    }

    let chunks = splitter.chunk_records(records);
    let mut report = IngestReport {
        records: records.len(),
        chunks: chunks.len(),
        ..IngestReport::default()
    };

    let existing: Option<&dyn VectorIndex> = if options.replace {
        None
    } else {
        Some(&*index)
    };
    let pending = select_pending(chunks, existing, options.policy)?;
    report.skipped = report.chunks - pending.len();
    if pending.is_empty() && !options.replace {
        tracing::info!(
            "nothing to ingest: {} records, {} chunks already indexed",
            report.records,
            report.skipped
        );
        return Ok(report);
    }

    tracing::info!(
        "embedding {} chunks from {} records with {}",
        pending.len(),
        report.records,
        embedder.model_id()
    );
    progress.set_length(pending.len() as u64);

    let vectors: Vec<Vec<f32>> = stream::iter(pending.iter())
        .map(|chunk| async move {
            let vector = embedder.embed_one(&chunk.content).await.map_err(|err| {
                RagError::gateway(
                    "embedding",
                    format!("record {} chunk {}", chunk.source_id, chunk.ordinal),
                    err,
                )
            })?;
            progress.inc(1);
            Ok::<_, RagError>(vector)
        })
        .buffered(options.concurrency)
        .try_collect()
        .await?;

    let entries: Vec<EmbeddedChunk> = pending
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector))
        .collect();
    report.inserted = entries.len();
    if options.replace {
        index.replace_all(entries)?;
    } else {
        index.insert_many(entries)?;
    }

    tracing::info!(
        "ingested {} chunks ({} skipped); index holds {}",
        report.inserted,
        report.skipped,
        index.count()?
    );
    Ok(report)
}

fn select_pending(
    chunks: Vec<Chunk>,
    existing: Option<&dyn VectorIndex>,
    policy: IngestPolicy,
) -> Result<Vec<Chunk>> {
    match policy {
        IngestPolicy::Append => Ok(chunks),
        IngestPolicy::SkipIfPopulated => {
            let populated = match existing {
                Some(index) => index.count()? > 0,
                None => false,
            };
            if populated {
                tracing::debug!("index already populated; skipping ingestion");
                Ok(Vec::new())
            } else {
                Ok(chunks)
            }
        }
        IngestPolicy::SkipDuplicates => {
            let mut seen = HashSet::new();
            let mut pending = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let fingerprint = chunk.fingerprint();
                let indexed = match existing {
                    Some(index) => index.contains(&fingerprint)?,
                    None => false,
                };
                if seen.contains(&fingerprint) || indexed {
                    tracing::debug!(
                        "skipping duplicate chunk {} of record {}",
                        chunk.ordinal,
                        chunk.source_id
                    );
                    continue;
                }
                seen.insert(fingerprint);
                pending.push(chunk);
            }
            Ok(pending)
        }
    }
}

/// Options for [`ask`].
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub top_k: usize,
    pub timeout: Duration,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// An answer and the chunks it was grounded in.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<RetrievalResult>,
}

/// Embeds `question` and returns the `top_k` most similar chunks.
pub async fn retrieve(
    question: &str,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    top_k: usize,
) -> Result<Vec<RetrievalResult>> {
    if question.trim().is_empty() {
        return Err(RagError::InvalidParameter(
            "question must not be empty".to_string(),
        ));
    }

    let vector = embedder
        .embed_one(question)
        .await
        .map_err(|err| RagError::gateway("embedding", "question", err))?;
    Retriever::new(index).retrieve_scored(&vector, top_k)
}

/// Answers `question` from the indexed chunks.
///
/// An empty retrieval is not an error: the synthesizer still runs with an
/// empty context and the prompt tells the model to decline.
pub async fn ask(
    question: &str,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    synthesizer: &AnswerSynthesizer,
    options: &AskOptions,
) -> Result<Answer> {
    let sources = retrieve(question, embedder, index, options.top_k).await?;
    if sources.is_empty() {
        tracing::info!("no context retrieved for question; answering without context");
    } else {
        tracing::info!(
            "retrieved {} chunks (best score {:.3})",
            sources.len(),
            sources[0].score
        );
    }

    let chunks: Vec<Chunk> = sources.iter().map(|result| result.chunk.clone()).collect();
    let text = synthesizer
        .answer(question, &chunks, options.timeout)
        .await?;

    Ok(Answer {
        question: question.to_string(),
        text,
        sources,
    })
}
