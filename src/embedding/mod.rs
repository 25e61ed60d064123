//! Embedding collaborator abstraction and implementations.
//!
//! The pipeline treats embedding as an external capability,
//! `embed(text) -> vector`, whose latency it does not control. Calls are
//! synchronous; the sync controller runs them on blocking threads under
//! a timeout.
//!
//! Backends:
//! - **[`HashingEmbedder`]**: deterministic feature hashing, fully offline.
//! - **[`HttpEmbedder`]**: any OpenAI-compatible `/v1/embeddings` endpoint.
//! - **[`DisabledEmbedder`]**: always errors; the index stage is skipped.

mod hashing;
mod http;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, PipelineError, PipelineResult};
use crate::store::EmbeddingDocument;
use crate::sync::run_blocking;

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed one text. Implementations may block.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// A no-op embedding provider that always returns errors.
pub struct DisabledEmbedder;

impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Create the embedder named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"http"` | [`HttpEmbedder`] |
/// | `"disabled"` | [`DisabledEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims)?)),
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// The text embedded for a conversation.
pub fn document_text(doc: &EmbeddingDocument) -> String {
    let mut parts = vec![];

    if let Some(ref msg) = doc.first_user_message {
        parts.push(format!("User: {}", msg));
    }
    if let Some(ref msg) = doc.last_assistant_message {
        parts.push(format!("Assistant: {}", msg));
    }
    if !doc.topics.is_empty() {
        parts.push(format!("Topics: {}", doc.topics.join(", ")));
    }
    if !doc.files.is_empty() {
        parts.push(format!("Files: {}", doc.files.join(", ")));
    }

    parts.join("\n\n")
}

/// Identifies the input of an embedding; changes when the document or
/// the model does.
pub fn content_hash(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Embed `text`, bounding each attempt by `timeout`.
///
/// Transient failures (timeouts, rate limits, server and network errors)
/// are retried up to `max_retries` times with exponential backoff
/// starting at `backoff`. Anything else fails at once.
pub async fn embed_with_retry(
    embedder: Arc<dyn Embedder>,
    text: String,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
) -> PipelineResult<Vec<f32>> {
    let text: Arc<str> = text.into();
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff * 2u32.pow((attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let embedder = Arc::clone(&embedder);
        let input = Arc::clone(&text);
        let result = run_blocking("embed", timeout, move || {
            embedder.embed(&input).map_err(PipelineError::from)
        })
        .await;

        match result {
            Ok(vec) => return Ok(vec),
            Err(e) if e.is_transient() => {
                warn!(attempt, error = %e, "embedding attempt failed");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or(PipelineError::EmbeddingService(EmbeddingError::Empty)))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
