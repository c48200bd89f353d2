pub mod memory;
pub mod pinecone;
pub mod s3;

pub use memory::MemoryVectorIndex;
pub use pinecone::{sanitize_namespace, PineconeStore};
pub use s3::{make_file_key, AwsCredentials, S3BlobStore};
