//! SQLite-backed message store.
//!
//! Durable persistence via sqlx; confirmed rows are fanned out to open insert
//! feeds after the write commits.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convo_core::{ConvoError, InsertFeed, Message, MessageStore, NewMessage, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: Some(row.id),
            temp_id: None,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            created_at: row.created_at,
            status: None,
        }
    }
}

/// Durable [`MessageStore`] backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
    feeds: crate::feeds::FeedRegistry,
}

impl SqliteMessageStore {
    /// Connects to the given database URL (file or in-memory) and creates the
    /// schema if missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing SQLite message store: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ConvoError::Store(e.to_string()))?
            .create_if_missing(true);

        // One connection: an in-memory URL would otherwise open a separate
        // database per pool connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ConvoError::Store(e.to_string()))?;

        let store = Self {
            pool,
            feeds: crate::feeds::FeedRegistry::new(),
        };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ConvoError::Store(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ConvoError::Store(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConvoError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let confirmed = Message {
            id: Some(Uuid::new_v4().to_string()),
            temp_id: None,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            created_at: Utc::now(),
            status: None,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(confirmed.id.as_deref())
        .bind(&confirmed.conversation_id)
        .bind(&confirmed.sender_id)
        .bind(&confirmed.content)
        .bind(confirmed.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ConvoError::Store(e.to_string()))?;

        info!(
            conversation_id = %confirmed.conversation_id,
            sender_id = %confirmed.sender_id,
            "message appended"
        );

        self.feeds.notify(&confirmed);
        Ok(confirmed)
    }

    async fn subscribe_inserts(&self, conversation_id: &str) -> Result<InsertFeed> {
        Ok(self.feeds.subscribe(conversation_id))
    }
}
