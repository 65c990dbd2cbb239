// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - chunking and the embedding gateway
//!
//! Records are split into overlapping chunks, and chunks and queries are
//! turned into vectors by an [`EmbeddingProvider`] chosen from configuration.

pub mod chunker;
pub mod gemini;
pub mod provider;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

pub use chunker::{split, Chunk, ChunkConfig, TextSplitter};
pub use gemini::GeminiEmbedder;
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::{FastEmbedConfig, FastEmbedder};
pub use provider::{CommandProvider, EmbeddingProvider, HashingEmbedder, DEFAULT_EMBEDDING_DIM};

/// Builds the configured embedding provider.
///
/// `gemini_api_key` is only consulted for the Gemini provider.
pub fn build_provider(
    config: &EmbeddingConfig,
    gemini_api_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Hashing => {
            anyhow::ensure!(config.dimension() > 0, "embeddings.dimension must be > 0");
            Arc::new(HashingEmbedder::new(config.dimension()))
        }
        EmbeddingProviderType::Command => Arc::new(CommandProvider::new(
            config.command().to_string(),
            config.model().unwrap_or("local-model-id").to_string(),
        )),
        EmbeddingProviderType::Gemini => {
            let key = gemini_api_key
                .context("GEMINI_API_KEY must be set for the Gemini embedding provider")?;
            Arc::new(GeminiEmbedder::new(
                key,
                config
                    .model()
                    .unwrap_or(gemini::DEFAULT_GEMINI_EMBEDDING_MODEL),
                config.base_url.as_deref(),
                config.request_timeout(),
                config.max_retries(),
            )?)
        }
        #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
        EmbeddingProviderType::Builtin => Arc::new(FastEmbedder::new(
            FastEmbedConfig::from_model_name(
                config.model(),
                config.max_chars(),
                config.normalize(),
            )?,
        )?),
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        EmbeddingProviderType::Builtin => {
            anyhow::bail!("the builtin embedding provider is not available on this platform")
        }
    };

    tracing::debug!("embedding provider: {}", provider.model_id());
    Ok(provider)
}
