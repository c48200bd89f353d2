use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{IngestError, UpstreamError};
use crate::models::{VectorMatch, VectorRecord};

/// Opaque byte storage keyed by string. No transformation of content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`. A missing key is
    /// [`IngestError::BlobNotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError>;

    /// Store `bytes` under `key`, returning the key.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, IngestError>;

    /// Stable access URL for a stored key.
    fn public_url(&self, key: &str) -> String;
}

/// Namespaced vector storage with top-K similarity queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent per record id: re-upserting an id overwrites its vector
    /// and metadata. No ordering guarantee across distinct ids.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord])
        -> Result<(), UpstreamError>;

    /// At most `top_k` matches, descending similarity. Namespace isolation
    /// is absolute: a query never returns another namespace's records.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamError>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Arc<T> {
    async fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), UpstreamError> {
        (**self).upsert(namespace, records).await
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamError> {
        (**self).query(namespace, vector, top_k).await
    }
}
