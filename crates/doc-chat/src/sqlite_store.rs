//! SQLite-backed implementations of the relational store traits.
//!
//! Each trait method maps to one or more raw SQL statements against the
//! schema created by [`crate::migrate`]. Ids are UUID v4 strings assigned
//! on save when the entity has none; timestamps are Unix milliseconds.
//! Message `sources` persist as a JSON array in `sources_json`, NULL when
//! the message carried none — NULL and `[]` are not the same thing to
//! callers, so an empty list is never written.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use doc_chat_core::models::{Conversation, Document, Message, Role, Source};
use doc_chat_core::store::{ConversationStore, DocumentStore, MessageStore};

fn ts_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow!("timestamp out of range: {}", millis))
}

/// SQLite [`ConversationStore`].
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: Some(row.get("id")),
        created_at: ts_to_datetime(row.get("created_at"))?,
        updated_at: ts_to_datetime(row.get("updated_at"))?,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn save(&self, conversation: &Conversation) -> Result<String> {
        let id = conversation
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query("INSERT INTO conversations (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(conversation.created_at.timestamp_millis())
            .bind(conversation.updated_at.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let row =
            sqlx::query("SELECT id, created_at, updated_at FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn update(&self, conversation: &Conversation) -> Result<()> {
        let id = conversation
            .id
            .as_deref()
            .ok_or_else(|| anyhow!("cannot update a conversation without an id"))?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(conversation.updated_at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, created_at, updated_at FROM conversations ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// SQLite [`MessageStore`].
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save(&self, message: &Message, conversation_id: &str) -> Result<String> {
        let id = message
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let sources_json = match &message.sources {
            Some(sources) => Some(serde_json::to_string(sources)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, sources_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&sources_json)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, sources_json, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let role_str: String = row.get("role");
            let role = Role::parse(&role_str)
                .ok_or_else(|| anyhow!("unknown message role in store: {:?}", role_str))?;

            let sources: Option<Vec<Source>> = match row.get::<Option<String>, _>("sources_json") {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };

            messages.push(Message {
                id: Some(row.get("id")),
                role,
                content: row.get("content"),
                created_at: ts_to_datetime(row.get("created_at"))?,
                sources,
            });
        }

        Ok(messages)
    }

    async fn delete_by_conversation_id(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SQLite [`DocumentStore`].
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    Ok(Document {
        id: Some(row.get("id")),
        filename: row.get("filename"),
        file_type: row.get("file_type"),
        chunk_count: row.get("chunk_count"),
        upload_date: ts_to_datetime(row.get("upload_date"))?,
        is_temporary: row.get::<i64, _>("is_temporary") != 0,
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn save(&self, document: &Document) -> Result<String> {
        let id = document
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, file_type, chunk_count, upload_date, is_temporary)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&document.filename)
        .bind(&document.file_type)
        .bind(document.chunk_count)
        .bind(document.upload_date.timestamp_millis())
        .bind(document.is_temporary as i64)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, file_type, chunk_count, upload_date, is_temporary FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, filename, file_type, chunk_count, upload_date, is_temporary FROM documents ORDER BY upload_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
