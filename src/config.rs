// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for faqrag
//!
//! Loads configuration from an explicit `--config` path, `.faqragrc.toml` in
//! the current directory, or `~/.config/faqrag/config.toml`. Configuration is
//! read once at startup and passed into component constructors; the library
//! never reads the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::chunker::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::provider::DEFAULT_EMBEDDING_DIM;
use crate::errors::RagError;

/// Name of the per-directory config file.
pub const CONFIG_FILE_NAME: &str = ".faqragrc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Google Generative Language embeddings
    #[default]
    Gemini,
    /// Local fastembed model
    Builtin,
    /// External process speaking JSON over stdin/stdout
    Command,
    /// Deterministic feature hashing, no model required
    Hashing,
}

/// Generative provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProviderType {
    /// Google Gemini
    #[default]
    Gemini,
    /// OpenAI-compatible chat completions
    OpenAi,
    /// Offline: echoes the best-ranked context block
    Extractive,
}

/// Vector index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite file, persists across runs
    #[default]
    Sqlite,
    /// In-process only; `query` needs `--source`
    Memory,
}

/// What ingestion does when the index already has content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestPolicy {
    /// Skip chunks whose fingerprint is already indexed
    #[default]
    SkipDuplicates,
    /// Skip the whole ingestion when the index is non-empty
    SkipIfPopulated,
    /// Insert everything, duplicates included
    Append,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 500)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 150)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Validated splitter configuration
    pub fn to_chunk_config(&self) -> Result<ChunkConfig, RagError> {
        ChunkConfig::new(self.chunk_size(), self.chunk_overlap())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (gemini, builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector dimension for the hashing provider
    pub dimension: Option<usize>,
    /// Maximum embedding calls in flight during ingestion
    pub concurrency: Option<usize>,
    /// Provider-side retries for remote providers
    pub max_retries: Option<usize>,
    /// Per-request HTTP timeout in seconds for remote providers
    pub request_timeout_secs: Option<u64>,
    /// Characters kept per text by the builtin provider
    pub max_chars: Option<usize>,
    /// L2-normalize builtin provider output
    pub normalize: Option<bool>,
    /// Override for the remote API base URL
    pub base_url: Option<String>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Gemini)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier, if configured
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get hashing dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }

    /// Get fan-out limit (defaults to 8, never below 1)
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(8).max(1)
    }

    /// Get max retries (defaults to 3)
    pub fn max_retries(&self) -> usize {
        self.max_retries.unwrap_or(3)
    }

    /// Get request timeout (defaults to 60 seconds)
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(60))
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(2000)
    }

    /// Get normalize flag (defaults to true)
    pub fn normalize(&self) -> bool {
        self.normalize.unwrap_or(true)
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider type (gemini, openai, extractive)
    pub provider: Option<GenerationProviderType>,
    /// Model identifier
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Provider-side retries
    pub max_retries: Option<usize>,
    /// Deadline for one generation call, in seconds
    pub timeout_secs: Option<u64>,
    /// Subject area answers are restricted to
    pub domain: Option<String>,
    /// Override for the remote API base URL
    pub base_url: Option<String>,
}

impl GenerationConfig {
    /// Get provider type (defaults to Gemini)
    pub fn provider(&self) -> GenerationProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier, if configured
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get temperature (defaults to 0.0)
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.0)
    }

    /// Get max retries (defaults to 3)
    pub fn max_retries(&self) -> usize {
        self.max_retries.unwrap_or(3)
    }

    /// Get generation timeout (defaults to 30 seconds)
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }

    /// Get domain (defaults to "the provided FAQ")
    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or("the provided FAQ")
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the generator
    pub top_k: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 5)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(5)
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend (sqlite, memory)
    pub backend: Option<StoreBackend>,
    /// SQLite file; defaults to `.faqrag/index.sqlite` under the index root
    pub path: Option<PathBuf>,
    /// Re-ingestion policy
    pub policy: Option<IngestPolicy>,
}

impl StoreConfig {
    /// Get backend (defaults to Sqlite)
    pub fn backend(&self) -> StoreBackend {
        self.backend.unwrap_or_default()
    }

    /// Get explicit path, if configured
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get ingestion policy (defaults to skip-duplicates)
    pub fn policy(&self) -> IngestPolicy {
        self.policy.unwrap_or_default()
    }
}

/// Configuration loaded from .faqragrc.toml or ~/.config/faqrag/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    pub embeddings: EmbeddingConfig,

    /// Generation configuration
    pub generation: GenerationConfig,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Store configuration
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .faqragrc.toml in current directory
    /// 2. ~/.config/faqrag/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_optional(Path::new(CONFIG_FILE_NAME)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("faqrag").join("config.toml");
            if let Some(config) = Self::load_optional(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from an explicit path; any failure is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn load_optional(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(config) => {
                tracing::debug!("loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {:#}", path.display(), e);
                None
            }
        }
    }
}
