//! OpenAI-compatible HTTP embedder

use anyhow::{anyhow, Result};
use std::time::Duration;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com";

/// Calls `POST {endpoint}/v1/embeddings` for one text at a time.
///
/// `OPENAI_API_KEY` is sent as a bearer token when set; local servers
/// (Ollama, llama.cpp) usually need none. Retries are the caller's
/// business, this only classifies the failure.
pub struct HttpEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for http provider"))?;
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        Ok(Self {
            model,
            dims: config.dims,
            url: format!("{}/v1/embeddings", endpoint.trim_end_matches('/')),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout: config.timeout(),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // Built per call: a blocking client must not be created or dropped
        // on an async worker thread.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut request = client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let vec = parse_response(&json)?;
        if vec.len() != self.dims {
            return Err(EmbeddingError::Dimensions {
                expected: self.dims,
                actual: vec.len(),
            });
        }
        Ok(vec)
    }
}

/// Extract `data[0].embedding` from an embeddings response.
fn parse_response(json: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or(EmbeddingError::Empty)?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
