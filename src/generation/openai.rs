// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::GenerativeProvider;
use crate::http::{json_client, post_json};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You answer user questions using only the context in the prompt and never invent facts.";

/// OpenAI-compatible chat completions client.
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_retries: usize,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        temperature: f32,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        let auth = format!("Bearer {}", api_key.trim());
        let client = json_client("OpenAI", AUTHORIZATION, &auth, timeout)?;
        let base = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base),
            model: model.to_string(),
            temperature,
            max_retries,
        })
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let parsed: ChatResponse =
            post_json(&self.client, &self.endpoint, &body, self.max_retries, "OpenAI")
                .await
                .context("OpenAI chat completion failed")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .context("OpenAI returned no choices")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
