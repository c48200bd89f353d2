use thiserror::Error;

/// Failure talking to a hosted service (embeddings, chat completions,
/// vector store, blob store). A non-success status, a payload we could
/// not make sense of, and a transport failure are kept distinct even
/// though callers handle all three the same way: propagate, no retry.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} returned a malformed payload: {details}")]
    Malformed {
        service: &'static str,
        details: String,
    },

    #[error("invalid request to {service}: {details}")]
    Request {
        service: &'static str,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no blob stored under key {0}")]
    BlobNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("embedding worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat {0} not found")]
    ChatNotFound(i64),

    #[error("no authenticated user")]
    Unauthorized,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
