// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest records into the configured index

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;

use crate::app::App;
use crate::cli::OutputFormat;
use faqrag::embedding::EmbeddingProvider;
use faqrag::index::{MemoryIndex, VectorIndex};
use faqrag::output::print_json;
use faqrag::pipeline::{self, IngestOptions, IngestReport};
use faqrag::records::load_records;

/// Ingest summary for JSON output
#[derive(Debug, Serialize)]
struct IngestSummary {
    source: String,
    index: String,
    model: String,
    entries: usize,
    #[serde(flatten)]
    report: IngestReport,
}

/// Progress bar for chunk embedding; hidden when stderr is not a terminal.
pub fn embedding_progress() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{bar:40.cyan/blue}] {pos}/{len} chunks | Embedding")
    {
        pb.set_style(style.progress_chars("##."));
    }
    pb
}

/// Run the ingest command
pub async fn run(
    app: &App,
    path: &Path,
    force: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    if app.uses_memory_store() {
        bail!(
            "store.backend = \"memory\" keeps nothing between runs; use `faqrag query --source {}` instead",
            path.display()
        );
    }

    let records = load_records(path)
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    let splitter = app.splitter()?;
    let embedder = app.embedder()?;

    let mut index = app.open_index()?;
    let options = IngestOptions {
        replace: force,
        ..app.ingest_options()
    };
    if force {
        tracing::info!("rebuilding index {}", index.path().display());
        index.rebind_model(embedder.model_id());
    } else {
        index.bind_model(embedder.model_id())?;
    }

    let progress = embedding_progress();
    let report = pipeline::ingest(
        &records,
        &splitter,
        embedder.as_ref(),
        &mut index,
        &options,
        &progress,
    )
    .await
    .context("Ingestion failed")?;
    progress.finish_and_clear();

    let summary = IngestSummary {
        source: path.display().to_string(),
        index: index.path().display().to_string(),
        model: embedder.model_id().to_string(),
        entries: index.count()?,
        report,
    };

    match format {
        OutputFormat::Json => print_json(&summary, compact)?,
        OutputFormat::Text => {
            println!(
                "{} Ingested {} chunks from {} records ({} skipped)",
                "✓".green(),
                summary.report.inserted.to_string().bold(),
                summary.report.records,
                summary.report.skipped
            );
            println!(
                "  {} {} ({} entries, {})",
                "index:".dimmed(),
                summary.index.cyan(),
                summary.entries,
                summary.model
            );
        }
    }

    Ok(())
}

/// Builds a throwaway in-memory index from a records file.
pub async fn build_memory_index(
    app: &App,
    source: &Path,
    embedder: &dyn EmbeddingProvider,
) -> Result<MemoryIndex> {
    let records = load_records(source)
        .with_context(|| format!("Failed to load records from {}", source.display()))?;

    let mut index = MemoryIndex::new();
    let progress = embedding_progress();
    pipeline::ingest(
        &records,
        &app.splitter()?,
        embedder,
        &mut index,
        &app.ingest_options(),
        &progress,
    )
    .await
    .context("Ingestion failed")?;
    progress.finish_and_clear();

    tracing::info!(
        "built in-memory index with {} entries from {}",
        index.count()?,
        source.display()
    );
    Ok(index)
}
