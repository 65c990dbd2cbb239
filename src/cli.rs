// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// faqrag - Answer questions from a FAQ corpus
///
/// Ingests question/answer records into a local vector index and answers
/// questions with a generative model grounded in the closest records.
#[derive(Parser, Debug)]
#[command(name = "faqrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Configuration file (defaults to .faqragrc.toml, then ~/.config/faqrag/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for Gemini embeddings and generation
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// API key for OpenAI-compatible generation
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load records (JSON array or NDJSON) into the index
    Ingest {
        /// Records file
        path: PathBuf,

        /// Clear the index before ingesting
        #[arg(short, long)]
        force: bool,
    },

    /// Answer a question from the indexed records
    Query {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// Generation deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Build an in-memory index from this records file instead of using the stored index
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Print the retrieved context and prompt without calling the generator
        #[arg(long)]
        dry_run: bool,
    },

    /// Show index location, size and embedding model
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_joins_words_and_reads_flags() {
        let cli = Cli::parse_from([
            "faqrag", "--format", "json", "query", "-k", "3", "--dry-run", "how", "many", "days",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Query {
                question,
                top_k,
                dry_run,
                ..
            } => {
                assert_eq!(question.join(" "), "how many days");
                assert_eq!(top_k, Some(3));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn query_requires_text() {
        assert!(Cli::try_parse_from(["faqrag", "query"]).is_err());
    }
}
