//! In-memory store implementations for tests and embedded use.
//!
//! `HashMap`/`Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine distance over every stored chunk, reporting
//! `distance = 1 − cosine_similarity` like the SQLite index does.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{Conversation, Document, Message};
use crate::vector::cosine_distance;

use super::{ConversationStore, DocumentStore, MessageStore, SearchHit, VectorIndex};

struct IndexedChunk {
    id: String,
    document_id: String,
    text: String,
    metadata: serde_json::Value,
    embedding: Vec<f32>,
}

/// Brute-force in-memory [`VectorIndex`].
#[derive(Default)]
pub struct InMemoryVectorIndex {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add_chunks(
        &self,
        document_id: &str,
        chunks: &[String],
        embeddings: &[Vec<f32>],
        metadata: &[serde_json::Value],
    ) -> Result<()> {
        if chunks.len() != embeddings.len() || chunks.len() != metadata.len() {
            return Err(ChatError::validation(format!(
                "chunk/embedding/metadata lengths differ: {}/{}/{}",
                chunks.len(),
                embeddings.len(),
                metadata.len()
            ))
            .into());
        }

        let mut stored = self.chunks.write().unwrap();
        for (i, text) in chunks.iter().enumerate() {
            stored.push(IndexedChunk {
                id: format!("{}_chunk_{}", document_id, i),
                document_id: document_id.to_string(),
                text: text.clone(),
                metadata: metadata[i].clone(),
                embedding: embeddings[i].clone(),
            });
        }
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let stored = self.chunks.read().unwrap();
        let mut hits: Vec<SearchHit> = stored
            .iter()
            .map(|chunk| SearchHit {
                id: chunk.id.clone(),
                document_text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                distance: Some(cosine_distance(query_embedding, &chunk.embedding)),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        stored.retain(|chunk| chunk.document_id != document_id);
        Ok(())
    }
}

/// In-memory [`ConversationStore`].
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save(&self, conversation: &Conversation) -> Result<String> {
        let id = conversation
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = conversation.clone();
        stored.id = Some(id.clone());
        self.conversations.write().unwrap().insert(id.clone(), stored);
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().unwrap().get(id).cloned())
    }

    async fn update(&self, conversation: &Conversation) -> Result<()> {
        if let Some(id) = &conversation.id {
            if let Some(existing) = self.conversations.write().unwrap().get_mut(id) {
                existing.updated_at = conversation.updated_at;
            }
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Conversation>> {
        let mut all: Vec<Conversation> =
            self.conversations.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conversations.write().unwrap().remove(id);
        Ok(())
    }
}

/// In-memory [`MessageStore`].
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<(String, Message)>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: &Message, conversation_id: &str) -> Result<String> {
        let id = message
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = message.clone();
        stored.id = Some(id.clone());
        self.messages
            .write()
            .unwrap()
            .push((conversation_id.to_string(), stored));
        Ok(id)
    }

    async fn get_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let stored = self.messages.read().unwrap();
        let mut messages: Vec<Message> = stored
            .iter()
            .filter(|(cid, _)| cid == conversation_id)
            .map(|(_, m)| m.clone())
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn delete_by_conversation_id(&self, conversation_id: &str) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .retain(|(cid, _)| cid != conversation_id);
        Ok(())
    }
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, document: &Document) -> Result<String> {
        let id = document
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = document.clone();
        stored.id = Some(id.clone());
        self.documents.write().unwrap().insert(id.clone(), stored);
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Document>> {
        let mut all: Vec<Document> = self.documents.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.documents.write().unwrap().remove(id);
        Ok(())
    }
}
