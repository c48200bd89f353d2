use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::UpstreamError;

pub const EMBEDDING_DIMENSIONS: usize = 1_536;
pub const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        (**self).embed(text).await
    }
}

/// Hosted embedding adapter. One request per input text; the response must
/// carry exactly one vector of the expected dimensionality.
pub struct OpenAiEmbedder {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(OPENAI_EMBEDDINGS_URL, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "input": text,
                "model": EMBEDDING_MODEL,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: "openai-embeddings",
                status: response.status().as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        let values = payload
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| UpstreamError::Malformed {
                service: "openai-embeddings",
                details: "missing data[0].embedding".to_string(),
            })?;

        let vector = values
            .iter()
            .map(|value| value.as_f64().map(|float| float as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| UpstreamError::Malformed {
                service: "openai-embeddings",
                details: "non-numeric embedding component".to_string(),
            })?;

        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(UpstreamError::Malformed {
                service: "openai-embeddings",
                details: format!(
                    "expected {EMBEDDING_DIMENSIONS} dimensions, got {}",
                    vector.len()
                ),
            });
        }

        Ok(vector)
    }
}

/// Deterministic stand-in for the hosted embedding service, for development
/// where embedding cost is unwanted. Vectors have the production length but
/// carry no semantic signal, so retrieval quality through this embedder is
/// meaningless. Selected only by explicit configuration.
#[derive(Debug, Clone, Copy)]
pub struct FakeEmbedder {
    pub seed: u64,
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self {
            seed: 0x00c0_ffee_d00d_f00d,
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let mut state = self.seed ^ fnv1a(text.as_bytes());
        let mut vector = Vec::with_capacity(EMBEDDING_DIMENSIONS);
        for _ in 0..EMBEDDING_DIMENSIONS {
            state = xorshift(state);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            vector.push((unit * 2.0 - 1.0) as f32);
        }
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

fn xorshift(mut state: u64) -> u64 {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    state
}
