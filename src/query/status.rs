// SPDX-License-Identifier: MIT OR Apache-2.0

//! Show index status

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::app::App;
use crate::cli::OutputFormat;
use faqrag::config::{EmbeddingProviderType, GenerationProviderType, StoreBackend};
use faqrag::index::VectorIndex;
use faqrag::output::print_json;

#[derive(Debug, Serialize)]
struct StatusReport {
    index: String,
    exists: bool,
    entries: usize,
    dimension: Option<usize>,
    model: Option<String>,
    backend: StoreBackend,
    embedding_provider: EmbeddingProviderType,
    generation_provider: GenerationProviderType,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
}

/// Run the status command
pub fn run(app: &App, format: OutputFormat, compact: bool) -> Result<()> {
    let path = app.index_path();
    let exists = path.exists();

    let (entries, dimension, model) = if exists {
        let index = app.open_index()?;
        (index.count()?, index.dimension(), index.model()?)
    } else {
        (0, None, None)
    };

    let config = &app.config;
    let report = StatusReport {
        index: path.display().to_string(),
        exists,
        entries,
        dimension,
        model,
        backend: config.store.backend(),
        embedding_provider: config.embeddings.provider(),
        generation_provider: config.generation.provider(),
        chunk_size: config.chunking.chunk_size(),
        chunk_overlap: config.chunking.chunk_overlap(),
        top_k: config.retrieval.top_k(),
    };

    match format {
        OutputFormat::Json => print_json(&report, compact)?,
        OutputFormat::Text => {
            if report.exists {
                println!("{} {}", "Index:".bold(), report.index.cyan());
            } else {
                println!("{} {} (not created yet)", "Index:".bold(), report.index.cyan());
            }
            println!("  entries:    {}", report.entries);
            println!(
                "  dimension:  {}",
                report
                    .dimension
                    .map_or_else(|| "-".to_string(), |d| d.to_string())
            );
            println!("  model:      {}", report.model.as_deref().unwrap_or("-"));
            println!(
                "  providers:  embeddings={:?} generation={:?}",
                report.embedding_provider, report.generation_provider
            );
            println!(
                "  chunking:   size={} overlap={} top_k={}",
                report.chunk_size, report.chunk_overlap, report.top_k
            );
        }
    }

    Ok(())
}
