use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// A chat session bound to exactly one uploaded document. Created when the
/// document is ingested, read many times, never mutated except deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub pdf_name: String,
    pub pdf_url: String,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub file_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    /// The assistant side of the conversation. Stored as `system` to match
    /// the persisted role enum.
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::System => "system",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ChatError> {
        match value {
            "user" => Ok(MessageRole::User),
            "system" => Ok(MessageRole::System),
            other => Err(ChatError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// One turn of a conversation. Append-only; ordering is creation timestamp
/// with ties broken by insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub role: MessageRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: i64,
    pub user_id: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

/// Billing identifiers written by webhook handling; upserted by `user_id`.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub user_id: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

/// A bounded window of page text. Exists only during ingestion; never
/// persisted relationally.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub text: String,
    pub page_number: u32,
}

/// Metadata carried on every vector record. `text` is the chunk text
/// truncated to the store's metadata byte budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkMetadata {
    pub text: String,
    #[serde(rename = "pageNumber")]
    pub page_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}
