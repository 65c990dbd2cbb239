// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a question from the index

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::app::App;
use crate::cli::OutputFormat;
use crate::indexer::ingest::build_memory_index;
use faqrag::embedding::Chunk;
use faqrag::index::{RetrievalResult, VectorIndex};
use faqrag::output::{
    colorize_context, colorize_heading, colorize_score, colorize_source, preview, print_json,
    use_colors,
};
use faqrag::pipeline::{self, Answer, AskOptions};
use faqrag::synthesizer::{build_prompt, render_context};

const PREVIEW_CHARS: usize = 72;

/// Parsed `query` arguments
pub struct QueryRequest<'a> {
    pub question: &'a str,
    pub top_k: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub source: Option<&'a Path>,
    pub dry_run: bool,
}

/// Dry-run result for JSON output
#[derive(Debug, Serialize)]
struct DryRun<'a> {
    question: &'a str,
    prompt: String,
    sources: Vec<RetrievalResult>,
}

/// Run the query command
pub async fn run(
    app: &App,
    request: QueryRequest<'_>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let embedder = app.embedder()?;

    let index: Box<dyn VectorIndex> = match request.source {
        Some(source) => Box::new(build_memory_index(app, source, embedder.as_ref()).await?),
        None => {
            if app.uses_memory_store() {
                bail!("store.backend = \"memory\" requires --source <records file>");
            }
            let path = app.index_path();
            if !path.exists() {
                bail!(
                    "No index at {}; run `faqrag ingest <records>` first",
                    path.display()
                );
            }
            let index = app.open_index()?;
            index.check_model(embedder.model_id())?;
            Box::new(index)
        }
    };

    let top_k = request
        .top_k
        .unwrap_or_else(|| app.config.retrieval.top_k());

    if request.dry_run {
        let sources =
            pipeline::retrieve(request.question, embedder.as_ref(), index.as_ref(), top_k)
                .await
                .context("Retrieval failed")?;
        let chunks: Vec<Chunk> = sources.iter().map(|r| r.chunk.clone()).collect();
        let dry_run = DryRun {
            question: request.question,
            prompt: build_prompt(
                app.config.generation.domain(),
                &render_context(&chunks),
                request.question,
            ),
            sources,
        };
        match format {
            OutputFormat::Json => print_json(&dry_run, compact)?,
            OutputFormat::Text => {
                let use_color = use_colors();
                print_sources(&dry_run.sources, use_color);
                println!("\n{}\n{}", colorize_heading("Prompt:", use_color), dry_run.prompt);
            }
        }
        return Ok(());
    }

    let options = AskOptions {
        top_k,
        timeout: request
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| app.config.generation.timeout()),
    };
    let synthesizer = app.synthesizer()?;
    let answer = pipeline::ask(
        request.question,
        embedder.as_ref(),
        index.as_ref(),
        &synthesizer,
        &options,
    )
    .await
    .context("Failed to answer question")?;

    match format {
        OutputFormat::Json => print_json(&answer, compact)?,
        OutputFormat::Text => print_answer(&answer, use_colors()),
    }
    Ok(())
}

fn print_answer(answer: &Answer, use_color: bool) {
    println!("{}", answer.text.trim_end());
    if answer.sources.is_empty() {
        println!("\n{} no matching records", "✗".red());
        return;
    }
    println!();
    print_sources(&answer.sources, use_color);
}

fn print_sources(sources: &[RetrievalResult], use_color: bool) {
    println!("{}", colorize_heading("Sources:", use_color));
    for (rank, result) in sources.iter().enumerate() {
        println!(
            "  {}. [{}] {} #{}  {}",
            rank + 1,
            colorize_score(result.score, use_color),
            colorize_source(&result.chunk.source_id, use_color),
            result.chunk.ordinal,
            colorize_context(&preview(&result.chunk.content, PREVIEW_CHARS), use_color)
        );
    }
}
