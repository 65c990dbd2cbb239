// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer synthesizer - prompt assembly and deadline-bounded generation.

use std::sync::Arc;
use std::time::Duration;

use crate::embedding::Chunk;
use crate::errors::{RagError, Result};
use crate::generation::GenerativeProvider;

/// Line that opens the context section of the prompt.
pub const CONTEXT_HEADER: &str = "Context:\n";

/// Separator between the context section and the question.
pub const QUESTION_PREFIX: &str = "\n\nQuestion: ";

/// Separator between chunk contents in the rendered context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Lifecycle of one synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    AssemblingPrompt,
    AwaitingGeneration,
    Completed,
    TimedOut,
    GenerationFailed,
}

impl SynthesisState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SynthesisState::Completed | SynthesisState::TimedOut | SynthesisState::GenerationFailed
        )
    }

    fn advance(self, next: SynthesisState) -> SynthesisState {
        tracing::debug!("synthesis: {:?} -> {:?}", self, next);
        next
    }
}

/// Joins chunk contents in retrieval order. Empty when there are no chunks.
pub fn render_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Fills the fixed answer template.
pub fn build_prompt(domain: &str, context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end.\n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         Do not answer the question if there is no given context.\n\
         Do not answer the question if it is not related to the context.\n\
         Do not answer questions about anything other than {domain}.\n\
         \n\
         {CONTEXT_HEADER}{context}{QUESTION_PREFIX}{question}"
    )
}

/// Builds a prompt from retrieved chunks and races generation against a deadline.
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerativeProvider>,
    domain: String,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerativeProvider>, domain: impl Into<String>) -> Self {
        Self {
            generator,
            domain: domain.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// The exact prompt `answer` would send for these inputs.
    pub fn prompt_for(&self, question: &str, chunks: &[Chunk]) -> String {
        build_prompt(&self.domain, &render_context(chunks), question)
    }

    /// Produces an answer grounded in `chunks`.
    ///
    /// Generation that has not finished after `timeout` is abandoned and
    /// reported as [`RagError::Timeout`]; its late result is discarded. The
    /// generator's text is returned verbatim.
    pub async fn answer(&self, question: &str, chunks: &[Chunk], timeout: Duration) -> Result<String> {
        if timeout.is_zero() {
            return Err(RagError::InvalidParameter(
                "generation timeout must be positive".to_string(),
            ));
        }

        let state = SynthesisState::Idle.advance(SynthesisState::AssemblingPrompt);
        let prompt = self.prompt_for(question, chunks);
        tracing::debug!(
            "prompt assembled from {} chunks ({} chars)",
            chunks.len(),
            prompt.chars().count()
        );

        let state = state.advance(SynthesisState::AwaitingGeneration);
        match tokio::time::timeout(timeout, self.generator.generate_grounded(&prompt, chunks))
            .await
        {
            Ok(Ok(text)) => {
                state.advance(SynthesisState::Completed);
                Ok(text)
            }
            Ok(Err(err)) => {
                state.advance(SynthesisState::GenerationFailed);
                Err(RagError::gateway("generation", self.generator.model_id(), err))
            }
            Err(_) => {
                state.advance(SynthesisState::TimedOut);
                tracing::warn!("generation abandoned after {:?}", timeout);
                Err(RagError::Timeout {
                    operation: "generation",
                    after: timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Records the prompt it was given and replies with a fixed text.
    struct Scripted {
        reply: anyhow::Result<String>,
        seen: Mutex<Option<String>>,
    }

    impl Scripted {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for Scripted {
        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            *self.seen.lock().unwrap() = Some(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(err) => Err(anyhow::anyhow!("{}", err)),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl GenerativeProvider for Stalled {
        fn model_id(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            source_id: "1".to_string(),
            ordinal: 0,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn prompt_contains_context_and_question() {
        let context = render_context(&[chunk("alpha"), chunk("beta")]);
        assert_eq!(context, "alpha\n\nbeta");

        let prompt = build_prompt("HR policy", &context, "What is alpha?");
        assert!(prompt.contains("Context:\nalpha\n\nbeta\n\nQuestion: What is alpha?"));
        assert!(prompt.ends_with("Question: What is alpha?"));
        assert!(prompt.contains("anything other than HR policy"));
        assert!(prompt.contains("no given context"));
    }

    #[test]
    fn empty_chunks_render_empty_context() {
        assert_eq!(render_context(&[]), "");
        let prompt = build_prompt("HR", "", "q");
        assert!(prompt.contains("Context:\n\n\nQuestion: q"));
    }

    #[tokio::test]
    async fn returns_generator_text_verbatim() {
        let generator = Arc::new(Scripted::ok("  Twenty days.\n"));
        let synthesizer = AnswerSynthesizer::new(generator.clone(), "HR");

        let text = synthesizer
            .answer("How many?", &[chunk("Answer: 20 days")], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "  Twenty days.\n");

        let seen = generator.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen, synthesizer.prompt_for("How many?", &[chunk("Answer: 20 days")]));
    }

    #[tokio::test]
    async fn empty_context_still_calls_generator() {
        let generator = Arc::new(Scripted::ok("I don't know."));
        let synthesizer = AnswerSynthesizer::new(generator.clone(), "HR");

        let text = synthesizer.answer("q", &[], Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "I don't know.");
        assert!(generator.seen.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn stalled_generation_times_out() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(Stalled), "HR");
        let err = synthesizer
            .answer("q", &[chunk("c")], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn generator_failure_is_a_gateway_failure() {
        let generator = Arc::new(Scripted {
            reply: Err(anyhow::anyhow!("quota exhausted")),
            seen: Mutex::new(None),
        });
        let synthesizer = AnswerSynthesizer::new(generator, "HR");
        let err = synthesizer
            .answer("q", &[chunk("c")], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::GatewayFailure { operation: "generation", .. }
        ));
    }

    #[tokio::test]
    async fn zero_timeout_is_invalid() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(Scripted::ok("x")), "HR");
        assert!(matches!(
            synthesizer.answer("q", &[], Duration::ZERO).await,
            Err(RagError::InvalidParameter(_))
        ));
    }

    #[test]
    fn terminal_states() {
        assert!(SynthesisState::TimedOut.is_terminal());
        assert!(!SynthesisState::AwaitingGeneration.is_terminal());
    }
}
