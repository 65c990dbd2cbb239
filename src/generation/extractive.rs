// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline generator that answers with the best retrieved passage.

use anyhow::Result;
use async_trait::async_trait;

use super::GenerativeProvider;
use crate::embedding::Chunk;
use crate::synthesizer::{CONTEXT_HEADER, CONTEXT_SEPARATOR, QUESTION_PREFIX};

pub const EXTRACTIVE_MODEL_ID: &str = "extractive";

/// Reply used when the prompt carries no context.
pub const NO_CONTEXT_REPLY: &str = "I don't know.";

/// Returns the top-ranked context chunk verbatim.
///
/// Given only a prompt, chunk boundaries are unknown and the first
/// separator-delimited block of the context is returned instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerativeProvider for ExtractiveGenerator {
    fn model_id(&self) -> &str {
        EXTRACTIVE_MODEL_ID
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(top_context_block(prompt)
            .unwrap_or(NO_CONTEXT_REPLY)
            .to_string())
    }

    async fn generate_grounded(&self, _prompt: &str, context: &[Chunk]) -> Result<String> {
        Ok(context
            .iter()
            .map(|chunk| chunk.content.trim())
            .find(|content| !content.is_empty())
            .unwrap_or(NO_CONTEXT_REPLY)
            .to_string())
    }
}

fn top_context_block(prompt: &str) -> Option<&str> {
    let start = prompt.find(CONTEXT_HEADER)? + CONTEXT_HEADER.len();
    let end = prompt.rfind(QUESTION_PREFIX)?;
    if end <= start {
        return None;
    }
    prompt[start..end]
        .split(CONTEXT_SEPARATOR)
        .map(str::trim)
        .find(|block| !block.is_empty())
}
