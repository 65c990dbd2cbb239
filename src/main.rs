// SPDX-License-Identifier: MIT OR Apache-2.0

//! faqrag - Retrieval-augmented answers over question/answer corpora
//!
//! Ingests FAQ records into a local vector index and answers questions
//! with a generative model grounded in the most similar records.

mod app;
mod cli;
mod indexer;
mod query;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with FAQRAG_LOG env var (e.g., FAQRAG_LOG=debug faqrag query "...")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FAQRAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "faqrag", &mut std::io::stdout());
        return Ok(());
    }

    let app = App::new(
        cli.config.as_deref(),
        cli.gemini_api_key,
        cli.openai_api_key,
    )?;

    match cli.command {
        Commands::Ingest { path, force } => {
            indexer::ingest::run(&app, &path, force, format, compact).await?;
        }
        Commands::Query {
            question,
            top_k,
            timeout,
            source,
            dry_run,
        } => {
            let question = question.join(" ");
            let request = query::ask::QueryRequest {
                question: &question,
                top_k,
                timeout_secs: timeout,
                source: source.as_deref(),
                dry_run,
            };
            query::ask::run(&app, request, format, compact).await?;
        }
        Commands::Status => {
            query::status::run(&app, format, compact)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
