use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::chunking::{chunk_id, split_page, truncate_utf8_bytes, ChunkingConfig, METADATA_TEXT_BUDGET};
use crate::embeddings::Embedder;
use crate::error::{IngestError, UpstreamError};
use crate::extractor::PdfExtractor;
use crate::models::{ChunkMetadata, DocumentChunk, VectorRecord};
use crate::stores::sanitize_namespace;
use crate::traits::{BlobStore, VectorIndex};

pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct IngestionOptions {
    pub chunking: ChunkingConfig,
    /// Width of the embedding worker pool. Bounds concurrent calls to the
    /// embedding service for a single document.
    pub embed_concurrency: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub namespace: String,
    pub page_count: usize,
    pub chunk_count: usize,
}

/// Turns one uploaded PDF into queryable vectors: fetch blob, extract page
/// text, chunk, embed, upsert into the key-derived namespace.
///
/// A failed run leaves already-upserted vectors in place; re-running the
/// same key is safe because record ids are content hashes, but chunks that
/// no longer exist are never pruned.
pub struct IngestionPipeline<B, E, V, X> {
    blobs: B,
    embedder: E,
    vectors: V,
    extractor: X,
    options: IngestionOptions,
}

impl<B, E, V, X> IngestionPipeline<B, E, V, X>
where
    B: BlobStore,
    E: Embedder + Clone + 'static,
    V: VectorIndex,
    X: PdfExtractor,
{
    pub fn new(blobs: B, embedder: E, vectors: V, extractor: X, options: IngestionOptions) -> Self {
        Self {
            blobs,
            embedder,
            vectors,
            extractor,
            options,
        }
    }

    pub async fn ingest(&self, file_key: &str) -> Result<IngestionSummary, IngestError> {
        info!(file_key, "fetching document from blob store");
        let bytes = self.blobs.get(file_key).await?;

        let pages = self.extractor.extract_pages(&bytes)?;
        let page_count = pages.len();

        let mut chunks = Vec::new();
        for page in &pages {
            chunks.extend(split_page(&page.text, page.number, self.options.chunking));
        }
        debug!(page_count, chunk_count = chunks.len(), "document chunked");

        let records = self.embed_chunks(chunks).await?;

        let namespace = sanitize_namespace(file_key);
        self.vectors.upsert(&namespace, &records).await?;

        info!(
            namespace = %namespace,
            vectors = records.len(),
            "ingestion complete"
        );
        Ok(IngestionSummary {
            namespace,
            page_count,
            chunk_count: records.len(),
        })
    }

    /// Embed chunks through a bounded worker pool, waiting for every chunk
    /// before returning. The first failure aborts the whole batch.
    async fn embed_chunks(
        &self,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<VectorRecord>, IngestError> {
        let width = self.options.embed_concurrency.max(1);
        let mut pending = chunks.into_iter().enumerate();
        let mut workers: JoinSet<Result<(usize, VectorRecord), UpstreamError>> = JoinSet::new();
        let mut finished: Vec<(usize, VectorRecord)> = Vec::new();

        loop {
            while workers.len() < width {
                let Some((index, chunk)) = pending.next() else {
                    break;
                };
                let embedder = self.embedder.clone();
                workers.spawn(async move {
                    let values = embedder.embed(&chunk.text).await?;
                    let metadata = ChunkMetadata {
                        text: truncate_utf8_bytes(&chunk.text, METADATA_TEXT_BUDGET).to_string(),
                        page_number: chunk.page_number,
                    };
                    Ok((
                        index,
                        VectorRecord {
                            id: chunk_id(&chunk.text),
                            values,
                            metadata,
                        },
                    ))
                });
            }

            match workers.join_next().await {
                Some(joined) => finished.push(joined??),
                None => break,
            }
        }

        finished.sort_by_key(|(index, _)| *index);
        Ok(finished.into_iter().map(|(_, record)| record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbedder;
    use crate::error::IngestError;
    use crate::extractor::PageText;
    use crate::stores::MemoryVectorIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeBlobStore {
        blobs: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError> {
            self.blobs
                .get(key)
                .cloned()
                .ok_or_else(|| IngestError::BlobNotFound(key.to_string()))
        }

        async fn put(&self, key: &str, _bytes: Vec<u8>) -> Result<String, IngestError> {
            Ok(key.to_string())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://blobs.test/{key}")
        }
    }

    struct FakeExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtractor for FakeExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Ok(self.pages.clone())
        }
    }

    /// Fails on every input containing the given marker.
    #[derive(Clone)]
    struct TrippingEmbedder {
        inner: FakeEmbedder,
        marker: &'static str,
    }

    #[async_trait]
    impl Embedder for TrippingEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
            if text.contains(self.marker) {
                return Err(UpstreamError::Status {
                    service: "openai-embeddings",
                    status: 500,
                });
            }
            self.inner.embed(text).await
        }
    }

    fn pipeline_for(
        key: &str,
        pages: Vec<PageText>,
    ) -> IngestionPipeline<FakeBlobStore, FakeEmbedder, Arc<MemoryVectorIndex>, FakeExtractor>
    {
        let blobs = FakeBlobStore {
            blobs: HashMap::from([(key.to_string(), b"%PDF-fake".to_vec())]),
        };
        IngestionPipeline::new(
            blobs,
            FakeEmbedder::default(),
            Arc::new(MemoryVectorIndex::new()),
            FakeExtractor { pages },
            IngestionOptions::default(),
        )
    }

    fn page(number: u32, length: usize) -> PageText {
        PageText {
            number,
            text: (0..length)
                .map(|index| char::from(b'a' + (index % 26) as u8))
                .collect(),
        }
    }

    #[tokio::test]
    async fn one_2500_char_page_yields_three_records_tagged_page_one() {
        let pipeline = pipeline_for("uploads/123abc.pdf", vec![page(1, 2_500)]);
        let summary = pipeline.ingest("uploads/123abc.pdf").await.unwrap();

        assert_eq!(summary.page_count, 1);
        assert_eq!(summary.chunk_count, 3);
        assert_eq!(summary.namespace, "uploads/123abc.pdf");

        let query = FakeEmbedder::default().embed("anything").await.unwrap();
        let matches = pipeline
            .vectors
            .query("uploads/123abc.pdf", &query, 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|hit| hit.metadata.page_number == 1));

        let mut lengths: Vec<usize> = matches
            .iter()
            .map(|hit| hit.metadata.text.chars().count())
            .collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![900, 1_000, 1_000]);
    }

    #[tokio::test]
    async fn missing_blob_key_is_a_not_found_failure() {
        let pipeline = pipeline_for("uploads/present.pdf", vec![page(1, 100)]);
        let error = pipeline.ingest("uploads/absent.pdf").await.unwrap_err();
        assert!(matches!(error, IngestError::BlobNotFound(key) if key == "uploads/absent.pdf"));
    }

    #[tokio::test]
    async fn single_chunk_embedding_failure_aborts_the_ingestion() {
        let blobs = FakeBlobStore {
            blobs: HashMap::from([("uploads/doc.pdf".to_string(), b"%PDF-fake".to_vec())]),
        };
        // Second page text carries the trip marker.
        let pages = vec![
            page(1, 300),
            PageText {
                number: 2,
                text: "TRIP this chunk".to_string(),
            },
        ];
        let pipeline = IngestionPipeline::new(
            blobs,
            TrippingEmbedder {
                inner: FakeEmbedder::default(),
                marker: "TRIP",
            },
            Arc::new(MemoryVectorIndex::new()),
            FakeExtractor { pages },
            IngestionOptions::default(),
        );

        let error = pipeline.ingest("uploads/doc.pdf").await.unwrap_err();
        assert!(matches!(
            error,
            IngestError::Upstream(UpstreamError::Status { status: 500, .. })
        ));
        // Nothing reached the index: the failure surfaced before upsert.
        assert_eq!(pipeline.vectors.record_count("uploads/doc.pdf"), 0);
    }

    #[tokio::test]
    async fn reingesting_the_same_key_does_not_duplicate_records() {
        let pipeline = pipeline_for("uploads/stable.pdf", vec![page(1, 2_500)]);
        pipeline.ingest("uploads/stable.pdf").await.unwrap();
        pipeline.ingest("uploads/stable.pdf").await.unwrap();

        assert_eq!(pipeline.vectors.record_count("uploads/stable.pdf"), 3);
    }

    #[tokio::test]
    async fn keys_that_sanitize_identically_share_one_namespace() {
        let index = Arc::new(MemoryVectorIndex::new());
        let keys = ["uploads/abc\u{2728}.pdf", "uploads/abc\u{2744}.pdf"];

        for (offset, key) in keys.iter().enumerate() {
            let blobs = FakeBlobStore {
                blobs: HashMap::from([(key.to_string(), b"%PDF-fake".to_vec())]),
            };
            let pipeline = IngestionPipeline::new(
                blobs,
                FakeEmbedder::default(),
                Arc::clone(&index),
                FakeExtractor {
                    pages: vec![page(1, 100 + offset * 50)],
                },
                IngestionOptions::default(),
            );
            pipeline.ingest(key).await.unwrap();
        }

        // Both documents' records collide into the one sanitized namespace.
        assert_eq!(index.record_count("uploads/abc.pdf"), 2);
    }
}
