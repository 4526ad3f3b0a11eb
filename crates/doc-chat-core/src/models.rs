//! Core data models for doc-chat.
//!
//! These types represent the documents, conversations, messages, and
//! citations that flow through the ingestion and chat pipelines. Ids are
//! UUID v4 strings; entities created in memory carry `id: None` until a
//! store assigns one on save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message. The set is closed: persisted rows outside it
/// are a data error, not a new variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a stored role string. Returns `None` for anything outside
    /// the closed set.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// An ingested document's metadata. The document body itself is not kept;
/// its content lives as chunks in the vector index, tagged with this
/// document's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<String>,
    pub filename: String,
    pub file_type: String,
    pub chunk_count: i64,
    pub upload_date: DateTime<Utc>,
    pub is_temporary: bool,
}

impl Document {
    pub fn new(filename: impl Into<String>, file_type: impl Into<String>) -> Self {
        Document {
            id: None,
            filename: filename.into(),
            file_type: file_type.into(),
            chunk_count: 0,
            upload_date: Utc::now(),
            is_temporary: false,
        }
    }
}

/// A chat conversation. Messages are owned by the conversation but loaded
/// separately through the message store; cascade deletion is the
/// conversation store's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh, unsaved conversation with `created_at == updated_at`.
    pub fn new() -> Self {
        let now = Utc::now();
        Conversation {
            id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// A citation attached to an assistant message: where a piece of evidence
/// came from. `content` is a bounded preview of the chunk, not its full
/// text. `relevance_score` is `1 − distance` when the vector index
/// reported a distance, and absent otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub content: String,
    pub relevance_score: Option<f64>,
}

/// One message in a conversation. `sources` is populated only on
/// assistant messages that used retrieved evidence; it is `None` — never
/// an empty list — when evidence was not used, so callers can tell the
/// two apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sources: Option<Vec<Source>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            id: None,
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Option<Vec<Source>>) -> Self {
        Message {
            id: None,
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            sources,
        }
    }
}
