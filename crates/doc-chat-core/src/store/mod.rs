//! Storage abstractions for doc-chat.
//!
//! Two independent stores back the pipeline: the **vector index** holding
//! embedded chunks, and the **relational store** holding documents,
//! conversations, and messages. They have no shared transaction
//! coordinator — callers that must write to both do so in a deliberate
//! order and accept partial state on failure.
//!
//! All traits are async (via `async-trait`) and `Send + Sync` so
//! implementations work behind `Arc<dyn _>` across await points. The
//! in-memory implementations in [`memory`] return immediately-ready
//! futures and exist for tests; SQLite implementations live in the app
//! crate.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Conversation, Document, Message};

/// One nearest-neighbor result from the vector index, in index-native
/// ranking order.
///
/// `metadata` is whatever the index stored alongside the chunk; consumers
/// must tolerate missing fields. `distance` is absent when the index
/// backend cannot report one — absence is not zero.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Index-assigned chunk id.
    pub id: String,
    /// Full chunk text as stored at ingestion time.
    pub document_text: String,
    /// Chunk metadata (`document_id`, `filename`, `chunk_index`, ...).
    pub metadata: serde_json::Value,
    /// Dissimilarity metric; `similarity = 1 − distance`.
    pub distance: Option<f64>,
}

/// Nearest-neighbor store of embedded chunks, keyed by owning document.
///
/// Deleting a document does **not** cascade here automatically — callers
/// must invoke [`delete_document`](VectorIndex::delete_document)
/// explicitly when removing a document from the relational store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store chunks for a document. `chunks`, `embeddings`, and `metadata`
    /// must be the same length; a mismatch is a validation error.
    async fn add_chunks(
        &self,
        document_id: &str,
        chunks: &[String],
        embeddings: &[Vec<f32>],
        metadata: &[serde_json::Value],
    ) -> Result<()>;

    /// Top-k nearest chunks by embedding distance. Searching an empty
    /// index returns an empty list, not an error.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// Remove every chunk tagged with `document_id`.
    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

/// Durable log of conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a conversation, assigning an id when it has none.
    /// Returns the (possibly new) id.
    async fn save(&self, conversation: &Conversation) -> Result<String>;

    /// Fetch by id, without messages. `None` when it does not exist.
    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>>;

    /// Persist updated fields. Only `updated_at` is expected to change
    /// after creation.
    async fn update(&self, conversation: &Conversation) -> Result<()>;

    /// All conversations, ordered by `updated_at` descending.
    async fn list_all(&self) -> Result<Vec<Conversation>>;

    /// Delete a conversation and, by cascade, all of its messages.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Durable log of messages within conversations.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message under a conversation, assigning an id when it
    /// has none. Returns the (possibly new) id.
    async fn save(&self, message: &Message, conversation_id: &str) -> Result<String>;

    /// All messages for a conversation, ordered by `created_at` ascending.
    async fn get_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Remove every message belonging to a conversation.
    async fn delete_by_conversation_id(&self, conversation_id: &str) -> Result<()>;
}

/// Metadata rows for ingested documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document, assigning an id when it has none.
    async fn save(&self, document: &Document) -> Result<String>;

    /// Fetch by id. `None` when it does not exist.
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, ordered by `upload_date` descending.
    async fn list_all(&self) -> Result<Vec<Document>>;

    /// Delete the metadata row. Vector-index chunks are a separate,
    /// explicit delete.
    async fn delete(&self, id: &str) -> Result<()>;
}
