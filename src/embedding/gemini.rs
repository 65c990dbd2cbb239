// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Generative Language embeddings client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderName;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use crate::http::{json_client, post_json};

/// Default REST base for the Generative Language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Embeds texts through `models/{model}:batchEmbedContents`.
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
}

impl GeminiEmbedder {
    /// Builds a new client. `base_url` defaults to [`GEMINI_BASE_URL`].
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing Gemini embedding model name");
        let client = json_client(
            "Gemini",
            HeaderName::from_static("x-goog-api-key"),
            api_key.trim(),
            timeout,
        )?;
        let base = base_url.unwrap_or(GEMINI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{}/models/{}:batchEmbedContents", base, model),
            model: model.to_string(),
            max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = format!("models/{}", self.model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };

        let response: BatchEmbedResponse =
            post_json(&self.client, &self.endpoint, &request, self.max_retries, "Gemini")
                .await
                .context("Gemini embedding request failed")?;

        anyhow::ensure!(
            response.embeddings.len() == texts.len(),
            "Gemini returned {} embeddings for {} inputs",
            response.embeddings.len(),
            texts.len()
        );
        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeds_batch_in_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/text-embedding-004:batchEmbedContents")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#)
            .create_async()
            .await;

        let embedder = GeminiEmbedder::new(
            "test-key",
            DEFAULT_GEMINI_EMBEDDING_MODEL,
            Some(server.url().as_str()),
            Duration::from_secs(5),
            0,
        )
        .unwrap();
        let vectors = embedder
            .embed_texts(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn surfaces_provider_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/text-embedding-004:batchEmbedContents")
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let embedder = GeminiEmbedder::new(
            "test-key",
            DEFAULT_GEMINI_EMBEDDING_MODEL,
            Some(server.url().as_str()),
            Duration::from_secs(5),
            0,
        )
        .unwrap();
        let err = embedder.embed_one("text").await.unwrap_err();
        assert!(format!("{:#}", err).contains("400"));
    }

    #[test]
    fn rejects_missing_key() {
        assert!(GeminiEmbedder::new(" ", "m", None, Duration::from_secs(1), 0).is_err());
    }
}
