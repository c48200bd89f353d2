use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::UpstreamError;
use crate::models::{VectorMatch, VectorRecord};
use crate::traits::VectorIndex;

/// In-memory vector index with brute-force cosine scoring. Backs tests and
/// local development where a hosted vector store is unavailable.
#[derive(Default)]
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in a namespace.
    pub fn record_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap()
            .get(namespace)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), UpstreamError> {
        let mut namespaces = self.namespaces.write().unwrap();
        let stored = namespaces.entry(namespace.to_string()).or_default();

        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamError> {
        let namespaces = self.namespaces.read().unwrap();
        let Some(stored) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_left = 0.0f32;
    let mut norm_right = 0.0f32;
    for (a, b) in left.iter().zip(right.iter()) {
        dot += a * b;
        norm_left += a * a;
        norm_right += b * b;
    }

    let denominator = norm_left.sqrt() * norm_right.sqrt();
    if denominator < f32::EPSILON {
        return 0.0;
    }
    dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                text: format!("text for {id}"),
                page_number: 1,
            },
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_id() {
        let index = MemoryVectorIndex::new();
        index
            .upsert("ns", &[record("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("ns", &[record("a", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.record_count("ns"), 1);
        let matches = index.query("ns", &[0.0, 1.0], 5).await.unwrap();
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn queries_never_cross_namespaces() {
        let index = MemoryVectorIndex::new();
        index
            .upsert("uploads/a.pdf", &[record("a", vec![1.0, 0.0])])
            .await
            .unwrap();

        let matches = index.query("uploads/b.pdf", &[1.0, 0.0], 5).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn matches_come_back_in_descending_score_order() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(
                "ns",
                &[
                    record("orthogonal", vec![0.0, 1.0]),
                    record("aligned", vec![1.0, 0.0]),
                    record("diagonal", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let matches = index.query("ns", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "aligned");
        assert_eq!(matches[1].id, "diagonal");
    }
}
