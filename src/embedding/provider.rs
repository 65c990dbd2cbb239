// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers are async so ingestion can fan out embedding calls; local
//! models run on the blocking pool.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
use std::sync::{Arc, Mutex};

/// Default embedding dimension for sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const DEFAULT_MAX_CHARS: usize = 2000;

/// Tokens shorter than this are ignored by the hashing embedder.
const MIN_TOKEN_CHARS: usize = 3;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Generates embeddings for the given texts, one vector per text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()]).await?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Configuration for the fastembed provider.
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
#[derive(Debug, Clone)]
pub struct FastEmbedConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl Default for FastEmbedConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            normalize: true,
        }
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl FastEmbedConfig {
    /// Builds a config from a model name as written in the config file.
    pub fn from_model_name(name: Option<&str>, max_chars: usize, normalize: bool) -> Result<Self> {
        Ok(Self {
            model: parse_model(name.unwrap_or(DEFAULT_FASTEMBED_MODEL))?,
            max_chars: if max_chars == 0 {
                DEFAULT_MAX_CHARS
            } else {
                max_chars
            },
            normalize,
            ..Default::default()
        })
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub struct FastEmbedder {
    embedder: Arc<Mutex<TextEmbedding>>,
    config: FastEmbedConfig,
    model_id: String,
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl FastEmbedder {
    pub fn new(config: FastEmbedConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder: Arc::new(Mutex::new(embedder)),
            config,
            model_id,
        })
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared: Vec<String> = truncate_texts(texts, self.config.max_chars)
            .into_iter()
            .map(Cow::into_owned)
            .collect();
        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.config.batch_size;

        let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model = embedder
                .lock()
                .map_err(|_| anyhow::anyhow!("fastembed model lock poisoned"))?;
            model
                .embed(&prepared, Some(batch_size))
                .map_err(|err| anyhow::anyhow!("fastembed embedding failed: {}", err))
        })
        .await
        .context("fastembed worker panicked")??;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The process receives `{"model": .., "texts": [..]}` on stdin and must
/// print either a JSON array of vectors or an object holding one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self { command, model }
    }

    async fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .await
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let vectors = parse_command_output(&String::from_utf8_lossy(&output.stdout))?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts).await
    }
}

/// Deterministic offline provider based on feature hashing.
///
/// Each lowercase alphanumeric token of at least three characters adds one
/// to a bucket chosen by its blake3 hash; vectors are L2-normalized. Texts
/// sharing vocabulary score higher, which is enough for tests and for
/// running the pipeline without a model.
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
}

impl HashingEmbedder {
    /// Creates a hashing embedder with the given dimension (at least 1).
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model_id: format!("hashing-{}", dimension),
            dimension,
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let mut word = [0_u8; 8];
            word.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }
}

fn parse_command_output(stdout: &str) -> Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(stdout.trim())
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn parse_model(name: &str) -> Result<EmbeddingModel> {
    let value = name.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported builtin embedding model '{}'. Supported value: {}",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_provider_is_deterministic() {
        let provider = HashingEmbedder::new(64);
        assert_eq!(provider.model_id(), "hashing-64");

        let first = provider.embed_one("Employees get 20 days per year.").await.unwrap();
        let second = provider.embed_one("employees GET 20 days per year").await.unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, second);

        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_provider_shares_vocabulary() {
        let provider = HashingEmbedder::new(DEFAULT_EMBEDDING_DIM);
        let query = provider.embed_one("vacation days").await.unwrap();
        let related = provider.embed_one("vacation days policy").await.unwrap();
        let unrelated = provider.embed_one("password reset settings").await.unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_hashing_provider_short_tokens_give_zero_vector() {
        let provider = HashingEmbedder::new(16);
        let vector = provider.embed_one("a b c 12").await.unwrap();
        assert!(vector.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_empty_embed() {
        let provider = HashingEmbedder::new(8);
        assert!(provider.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_command_provider_round_trip() {
        let provider = CommandProvider::new(
            r#"cat > /dev/null; echo '{"embeddings": [[1.0, 0.5], [0.0, 2.0]]}'"#.to_string(),
            "fake".to_string(),
        );
        let vectors = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.5], vec![0.0, 2.0]]);
    }

    #[tokio::test]
    async fn test_command_provider_count_mismatch() {
        let provider = CommandProvider::new(
            "cat > /dev/null; echo '[[1.0]]'".to_string(),
            "fake".to_string(),
        );
        let err = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 texts"));
    }

    #[tokio::test]
    async fn test_command_provider_failure_status() {
        let provider = CommandProvider::new(
            "cat > /dev/null; echo boom >&2; exit 3".to_string(),
            "fake".to_string(),
        );
        let err = provider.embed_one("a").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_parse_command_output_shapes() {
        assert_eq!(parse_command_output("[[1, 2]]").unwrap(), vec![vec![1.0, 2.0]]);
        assert_eq!(
            parse_command_output(r#"{"data": [[3]]}"#).unwrap(),
            vec![vec![3.0]]
        );
        assert!(parse_command_output(r#"{"other": []}"#).is_err());
        assert!(parse_command_output("[[\"x\"]]").is_err());
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "héllo";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("hé".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
    }
}
