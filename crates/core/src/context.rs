use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::UpstreamError;
use crate::stores::sanitize_namespace;
use crate::traits::VectorIndex;

pub const TOP_K: usize = 5;

/// Matches must score strictly above this to qualify for the context block.
pub const SCORE_THRESHOLD: f32 = 0.7;

pub const CONTEXT_CHAR_BUDGET: usize = 3_000;

/// Builds the bounded context string for a query against one document's
/// namespace: embed the query, take the top matches, keep the qualifying
/// ones in returned (descending-similarity) order, join, truncate.
pub struct ContextAssembler<E, V> {
    embedder: E,
    vectors: V,
}

impl<E, V> ContextAssembler<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(embedder: E, vectors: V) -> Self {
        Self { embedder, vectors }
    }

    /// An empty string is a valid outcome: it means no stored chunk was
    /// relevant enough, and the prompt must tell the model to admit that.
    pub async fn get_context(
        &self,
        query: &str,
        file_key: &str,
    ) -> Result<String, UpstreamError> {
        let query_vector = self.embedder.embed(query).await?;
        let namespace = sanitize_namespace(file_key);
        let matches = self
            .vectors
            .query(&namespace, &query_vector, TOP_K)
            .await?;

        let qualifying: Vec<&str> = matches
            .iter()
            .filter(|hit| hit.score > SCORE_THRESHOLD)
            .map(|hit| hit.metadata.text.as_str())
            .collect();
        debug!(
            namespace = %namespace,
            matched = matches.len(),
            qualifying = qualifying.len(),
            "assembled retrieval context"
        );

        let joined = qualifying.join("\n");
        Ok(joined.chars().take(CONTEXT_CHAR_BUDGET).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbedder;
    use crate::models::{ChunkMetadata, VectorMatch, VectorRecord};
    use async_trait::async_trait;

    /// Returns a canned match list regardless of the query vector.
    struct CannedIndex {
        matches: Vec<VectorMatch>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn upsert(
            &self,
            _namespace: &str,
            _records: &[VectorRecord],
        ) -> Result<(), UpstreamError> {
            Ok(())
        }

        async fn query(
            &self,
            _namespace: &str,
            _vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorMatch>, UpstreamError> {
            Ok(self.matches.iter().take(top_k).cloned().collect())
        }
    }

    fn hit(score: f32, text: &str) -> VectorMatch {
        VectorMatch {
            id: format!("id-{text}"),
            score,
            metadata: ChunkMetadata {
                text: text.to_string(),
                page_number: 1,
            },
        }
    }

    fn assembler(matches: Vec<VectorMatch>) -> ContextAssembler<FakeEmbedder, CannedIndex> {
        ContextAssembler::new(FakeEmbedder::default(), CannedIndex { matches })
    }

    #[tokio::test]
    async fn only_matches_above_the_threshold_contribute() {
        let assembler = assembler(vec![
            hit(0.92, "first"),
            hit(0.81, "second"),
            hit(0.70, "at threshold"),
            hit(0.40, "far"),
        ]);

        let context = assembler
            .get_context("query", "uploads/doc.pdf")
            .await
            .unwrap();
        assert_eq!(context, "first\nsecond");
    }

    #[tokio::test]
    async fn all_low_scores_yield_an_empty_context() {
        let assembler = assembler(vec![hit(0.5, "a"), hit(0.5, "b"), hit(0.5, "c")]);

        let context = assembler
            .get_context("query", "uploads/doc.pdf")
            .await
            .unwrap();
        assert_eq!(context, "");
    }

    #[tokio::test]
    async fn qualifying_text_keeps_the_query_order() {
        let assembler = assembler(vec![hit(0.95, "most"), hit(0.85, "middle"), hit(0.75, "least")]);

        let context = assembler
            .get_context("query", "uploads/doc.pdf")
            .await
            .unwrap();
        assert_eq!(context, "most\nmiddle\nleast");
    }

    #[tokio::test]
    async fn context_is_truncated_to_the_character_budget() {
        let long = "x".repeat(4_000);
        let assembler = assembler(vec![hit(0.9, &long)]);

        let context = assembler
            .get_context("query", "uploads/doc.pdf")
            .await
            .unwrap();
        assert_eq!(context.chars().count(), CONTEXT_CHAR_BUDGET);
    }
}
