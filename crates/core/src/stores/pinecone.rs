use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::UpstreamError;
use crate::models::{ChunkMetadata, VectorMatch, VectorRecord};
use crate::traits::VectorIndex;

/// Derive the vector-store namespace for a document storage key by keeping
/// printable ASCII only. Two keys that sanitize identically share a
/// namespace; that collision is accepted, not worked around.
pub fn sanitize_namespace(file_key: &str) -> String {
    file_key
        .chars()
        .filter(|character| (' '..='~').contains(character))
        .collect()
}

pub struct PineconeStore {
    endpoint: String,
    api_key: String,
    client: Client,
    dimensions: usize,
}

impl PineconeStore {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
            dimensions,
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), UpstreamError> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            if record.values.len() != self.dimensions {
                return Err(UpstreamError::Request {
                    service: "pinecone",
                    details: format!(
                        "embedding dimension {} != {}",
                        record.values.len(),
                        self.dimensions
                    ),
                });
            }
        }

        let vectors = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "values": record.values,
                    "metadata": record.metadata,
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "vectors": vectors,
                "namespace": namespace,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: "pinecone",
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamError> {
        if vector.len() != self.dimensions {
            return Err(UpstreamError::Request {
                service: "pinecone",
                details: format!("query vector dim {} is not {}", vector.len(), self.dimensions),
            });
        }

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&json!({
                "namespace": namespace,
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: "pinecone",
                status: response.status().as_u16(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .ok_or_else(|| UpstreamError::Malformed {
                service: "pinecone",
                details: "missing matches array".to_string(),
            })?;

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = hit
                .pointer("/id")
                .and_then(Value::as_str)
                .ok_or_else(|| UpstreamError::Malformed {
                    service: "pinecone",
                    details: "match without id".to_string(),
                })?
                .to_string();

            let score = hit
                .pointer("/score")
                .and_then(Value::as_f64)
                .ok_or_else(|| UpstreamError::Malformed {
                    service: "pinecone",
                    details: format!("match {id} without score"),
                })? as f32;

            let metadata_value =
                hit.pointer("/metadata")
                    .cloned()
                    .ok_or_else(|| UpstreamError::Malformed {
                        service: "pinecone",
                        details: format!("match {id} without metadata"),
                    })?;

            let metadata: ChunkMetadata =
                serde_json::from_value(metadata_value).map_err(|error| {
                    UpstreamError::Malformed {
                        service: "pinecone",
                        details: format!("match {id} metadata: {error}"),
                    }
                })?;

            matches.push(VectorMatch {
                id,
                score,
                metadata,
            });
        }

        Ok(matches)
    }
}
