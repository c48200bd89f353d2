use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::ChatError;
use crate::models::{Chat, ChatMessage, MessageRole, SubscriptionUpdate, UserSubscription};

/// How many trailing conversation messages accompany each model invocation.
pub const RECENT_MESSAGE_WINDOW: usize = 10;

/// The last `window` entries of an already-ordered message list.
pub fn trailing_window(messages: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// Relational persistence for chats, messages, and billing identifiers.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_chat(
        &self,
        pdf_name: &str,
        pdf_url: &str,
        user_id: &str,
        file_key: &str,
    ) -> Result<Chat, ChatError>;

    async fn chat_by_id(&self, chat_id: i64) -> Result<Option<Chat>, ChatError>;

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, ChatError>;

    async fn latest_chat_for_user(&self, user_id: &str) -> Result<Option<Chat>, ChatError>;

    async fn insert_message(
        &self,
        chat_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, ChatError>;

    /// All messages of a chat, ordered by creation time, ties broken by
    /// insertion order.
    async fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<ChatMessage>, ChatError>;

    /// Delete every chat owned by `user_id`; messages cascade. Vectors in
    /// the documents' namespaces are left behind.
    async fn clear_history(&self, user_id: &str) -> Result<u64, ChatError>;

    async fn upsert_subscription(&self, update: &SubscriptionUpdate) -> Result<(), ChatError>;

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSubscription>, ChatError>;
}

pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, ChatError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Idempotent schema setup, run once at startup.
    pub async fn ensure_schema(&self) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id BIGSERIAL PRIMARY KEY,
                pdf_name TEXT NOT NULL,
                pdf_url TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                user_id VARCHAR(256) NOT NULL,
                file_key TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id BIGSERIAL PRIMARY KEY,
                chat_id BIGINT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                role TEXT NOT NULL CHECK (role IN ('system', 'user'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_subscriptions (
                id BIGSERIAL PRIMARY KEY,
                user_id VARCHAR(256) NOT NULL UNIQUE,
                stripe_customer_id VARCHAR(256) NOT NULL UNIQUE,
                stripe_subscription_id VARCHAR(256) UNIQUE,
                stripe_price_id VARCHAR(256),
                stripe_current_period_end TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn chat_from_row(row: &PgRow) -> Result<Chat, ChatError> {
    Ok(Chat {
        id: row.try_get("id")?,
        pdf_name: row.try_get("pdf_name")?,
        pdf_url: row.try_get("pdf_url")?,
        created_at: row.try_get("created_at")?,
        user_id: row.try_get("user_id")?,
        file_key: row.try_get("file_key")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage, ChatError> {
    let role: String = row.try_get("role")?;
    Ok(ChatMessage {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        role: MessageRole::parse(&role)?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<UserSubscription, ChatError> {
    Ok(UserSubscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        stripe_price_id: row.try_get("stripe_price_id")?,
        stripe_current_period_end: row.try_get("stripe_current_period_end")?,
    })
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create_chat(
        &self,
        pdf_name: &str,
        pdf_url: &str,
        user_id: &str,
        file_key: &str,
    ) -> Result<Chat, ChatError> {
        let row = sqlx::query(
            r#"
            INSERT INTO chats (pdf_name, pdf_url, user_id, file_key)
            VALUES ($1, $2, $3, $4)
            RETURNING id, pdf_name, pdf_url, created_at, user_id, file_key
            "#,
        )
        .bind(pdf_name)
        .bind(pdf_url)
        .bind(user_id)
        .bind(file_key)
        .fetch_one(&self.pool)
        .await?;

        chat_from_row(&row)
    }

    async fn chat_by_id(&self, chat_id: i64) -> Result<Option<Chat>, ChatError> {
        let row = sqlx::query(
            r#"
            SELECT id, pdf_name, pdf_url, created_at, user_id, file_key
            FROM chats
            WHERE id = $1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(chat_from_row).transpose()
    }

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, ChatError> {
        let rows = sqlx::query(
            r#"
            SELECT id, pdf_name, pdf_url, created_at, user_id, file_key
            FROM chats
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chat_from_row).collect()
    }

    async fn latest_chat_for_user(&self, user_id: &str) -> Result<Option<Chat>, ChatError> {
        let row = sqlx::query(
            r#"
            SELECT id, pdf_name, pdf_url, created_at, user_id, file_key
            FROM chats
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(chat_from_row).transpose()
    }

    async fn insert_message(
        &self,
        chat_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (chat_id, content, role)
            VALUES ($1, $2, $3)
            RETURNING id, chat_id, content, created_at, role
            "#,
        )
        .bind(chat_id)
        .bind(content)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        message_from_row(&row)
    }

    async fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<ChatMessage>, ChatError> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, content, created_at, role
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn clear_history(&self, user_id: &str) -> Result<u64, ChatError> {
        let result = sqlx::query("DELETE FROM chats WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_subscription(&self, update: &SubscriptionUpdate) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (
                user_id,
                stripe_customer_id,
                stripe_subscription_id,
                stripe_price_id,
                stripe_current_period_end
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_price_id = EXCLUDED.stripe_price_id,
                stripe_current_period_end = EXCLUDED.stripe_current_period_end
            "#,
        )
        .bind(&update.user_id)
        .bind(&update.stripe_customer_id)
        .bind(&update.stripe_subscription_id)
        .bind(&update.stripe_price_id)
        .bind(update.stripe_current_period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSubscription>, ChatError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, stripe_customer_id, stripe_subscription_id,
                   stripe_price_id, stripe_current_period_end
            FROM user_subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }
}
