// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Generative Language `generateContent` client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderName;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::GenerativeProvider;
use crate::embedding::gemini::GEMINI_BASE_URL;
use crate::http::{json_client, post_json};

/// Default chat model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_retries: usize,
}

impl GeminiGenerator {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        temperature: f32,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing Gemini model name");
        let client = json_client(
            "Gemini",
            HeaderName::from_static("x-goog-api-key"),
            api_key.trim(),
            timeout,
        )?;
        let base = base_url.unwrap_or(GEMINI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{}/models/{}:generateContent", base, model),
            model: model.to_string(),
            temperature,
            max_retries,
        })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response: GenerateResponse =
            post_json(&self.client, &self.endpoint, &request, self.max_retries, "Gemini")
                .await
                .context("Gemini generation request failed")?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            anyhow::bail!("Gemini returned no answer: {}", reason);
        };

        Ok(candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
