// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-invocation wiring: configuration and API keys to components.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use faqrag::config::{Config, StoreBackend};
use faqrag::embedding::{self, EmbeddingProvider, TextSplitter};
use faqrag::generation;
use faqrag::index::sqlite::INDEX_FILE_NAME;
use faqrag::index::SqliteIndex;
use faqrag::pipeline::IngestOptions;
use faqrag::synthesizer::AnswerSynthesizer;
use faqrag::utils::get_index_path;

pub struct App {
    pub config: Config,
    gemini_api_key: Option<String>,
    openai_api_key: Option<String>,
    cwd: PathBuf,
}

impl App {
    pub fn new(
        config_path: Option<&Path>,
        gemini_api_key: Option<String>,
        openai_api_key: Option<String>,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load(),
        };
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self {
            config,
            gemini_api_key,
            openai_api_key,
            cwd,
        })
    }

    pub fn splitter(&self) -> Result<TextSplitter> {
        Ok(TextSplitter::new(self.config.chunking.to_chunk_config()?))
    }

    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        embedding::build_provider(&self.config.embeddings, self.gemini_api_key.as_deref())
    }

    pub fn synthesizer(&self) -> Result<AnswerSynthesizer> {
        let generator = generation::build_provider(
            &self.config.generation,
            self.gemini_api_key.as_deref(),
            self.openai_api_key.as_deref(),
        )?;
        Ok(AnswerSynthesizer::new(
            generator,
            self.config.generation.domain(),
        ))
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            concurrency: self.config.embeddings.concurrency(),
            policy: self.config.store.policy(),
            replace: false,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.config.store.backend() == StoreBackend::Memory
    }

    /// `store.path` relative to the working directory, else the nearest
    /// `.faqrag/index.sqlite`.
    pub fn index_path(&self) -> PathBuf {
        match self.config.store.path() {
            Some(path) => self.cwd.join(path),
            None => get_index_path(&self.cwd).join(INDEX_FILE_NAME),
        }
    }

    pub fn open_index(&self) -> Result<SqliteIndex> {
        let path = self.index_path();
        SqliteIndex::open(&path)
            .with_context(|| format!("Failed to open index {}", path.display()))
    }
}
