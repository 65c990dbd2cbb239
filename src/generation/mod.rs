// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generative gateway - turns an assembled prompt into answer text.

pub mod extractive;
pub mod gemini;
pub mod openai;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{GenerationConfig, GenerationProviderType};
use crate::embedding::Chunk;

pub use extractive::ExtractiveGenerator;
pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

/// Trait implemented by text generation backends.
///
/// Implementations own their retry policy; callers only see the final
/// outcome of `generate`.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Identifier of the model producing the text.
    fn model_id(&self) -> &str;

    /// Generates a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generates a completion for a prompt built from `context`, ranked best
    /// first. Model-backed providers only need the prompt.
    async fn generate_grounded(&self, prompt: &str, _context: &[Chunk]) -> Result<String> {
        self.generate(prompt).await
    }
}

/// Builds the configured generative provider.
pub fn build_provider(
    config: &GenerationConfig,
    gemini_api_key: Option<&str>,
    openai_api_key: Option<&str>,
) -> Result<Arc<dyn GenerativeProvider>> {
    let provider: Arc<dyn GenerativeProvider> = match config.provider() {
        GenerationProviderType::Extractive => Arc::new(ExtractiveGenerator::new()),
        GenerationProviderType::Gemini => {
            let key = gemini_api_key
                .context("GEMINI_API_KEY must be set for the Gemini generation provider")?;
            Arc::new(GeminiGenerator::new(
                key,
                config.model().unwrap_or(gemini::DEFAULT_GEMINI_MODEL),
                config.base_url.as_deref(),
                config.temperature(),
                config.timeout(),
                config.max_retries(),
            )?)
        }
        GenerationProviderType::OpenAi => {
            let key = openai_api_key
                .context("OPENAI_API_KEY must be set for the OpenAI generation provider")?;
            Arc::new(OpenAiGenerator::new(
                key,
                config.model().unwrap_or(openai::DEFAULT_OPENAI_MODEL),
                config.base_url.as_deref(),
                config.temperature(),
                config.timeout(),
                config.max_retries(),
            )?)
        }
    };

    tracing::debug!("generation provider: {}", provider.model_id());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_extractive_without_keys() {
        let config = Config::parse("[generation]\nprovider = \"extractive\"\n").unwrap();
        let provider = build_provider(&config.generation, None, None).unwrap();
        assert_eq!(provider.model_id(), extractive::EXTRACTIVE_MODEL_ID);
    }

    #[test]
    fn remote_providers_require_keys() {
        let config = Config::default();
        let err = build_provider(&config.generation, None, None).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let config = Config::parse("[generation]\nprovider = \"openai\"\n").unwrap();
        let err = build_provider(&config.generation, Some("g"), None).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn gemini_uses_configured_model() {
        let config = Config::parse("[generation]\nmodel = \"gemini-2.0-flash\"\n").unwrap();
        let provider = build_provider(&config.generation, Some("key"), None).unwrap();
        assert_eq!(provider.model_id(), "gemini-2.0-flash");
    }
}
