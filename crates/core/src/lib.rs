pub mod chat;
pub mod chunking;
pub mod completion;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod stores;
pub mod traits;

pub use chat::{build_prompt, ChatService};
pub use chunking::{
    chunk_id, split_page, strip_newlines, truncate_utf8_bytes, ChunkingConfig,
    CHUNK_OVERLAP_CHARS, MAX_CHUNK_CHARS, METADATA_TEXT_BUDGET,
};
pub use completion::{ChatModel, OpenAiChatModel, PromptMessage, CHAT_MODEL};
pub use context::{ContextAssembler, CONTEXT_CHAR_BUDGET, SCORE_THRESHOLD, TOP_K};
pub use db::{trailing_window, ChatRepository, PgChatRepository, RECENT_MESSAGE_WINDOW};
pub use embeddings::{
    Embedder, FakeEmbedder, OpenAiEmbedder, EMBEDDING_DIMENSIONS, EMBEDDING_MODEL,
};
pub use error::{ChatError, IngestError, UpstreamError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    IngestionOptions, IngestionPipeline, IngestionSummary, DEFAULT_EMBED_CONCURRENCY,
};
pub use models::{
    Chat, ChatMessage, ChunkMetadata, DocumentChunk, MessageRole, SubscriptionUpdate,
    UserSubscription, VectorMatch, VectorRecord,
};
pub use stores::{
    make_file_key, sanitize_namespace, AwsCredentials, MemoryVectorIndex, PineconeStore,
    S3BlobStore,
};
pub use traits::{BlobStore, VectorIndex};
