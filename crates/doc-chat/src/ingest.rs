//! Document ingestion pipeline.
//!
//! Upload bytes go through extract → chunk → embed → index, and only then
//! does the document metadata row get written with its final chunk count.
//! A document that produces zero usable chunks is rejected outright —
//! nothing is written to either store.
//!
//! Deletion is the mirror image and crosses both stores explicitly: the
//! vector index does not cascade on its own, so chunks are removed first,
//! then the metadata row.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, instrument};
use uuid::Uuid;

use doc_chat_core::chunk::{chunk_text, rows_to_chunks};
use doc_chat_core::error::ChatError;
use doc_chat_core::gateway::EmbeddingGateway;
use doc_chat_core::models::Document;
use doc_chat_core::store::{DocumentStore, VectorIndex};

use crate::config::ChunkingConfig;
use crate::extract::{extract, is_supported_file_type, ExtractedContent};

/// Orchestrates document ingestion and deletion. Holds its collaborators
/// by handle; no global state.
pub struct IngestPipeline {
    embeddings: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    documents: Arc<dyn DocumentStore>,
    chunking: ChunkingConfig,
}

impl IngestPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        documents: Arc<dyn DocumentStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        IngestPipeline {
            embeddings,
            index,
            documents,
            chunking,
        }
    }

    /// Ingest one uploaded file. Returns the persisted [`Document`] with
    /// its id and chunk count filled in.
    #[instrument(skip(self, bytes), fields(filename = %filename, file_type = %file_type))]
    pub async fn ingest(
        &self,
        filename: &str,
        file_type: &str,
        bytes: &[u8],
        is_temporary: bool,
    ) -> Result<Document> {
        if filename.trim().is_empty() {
            return Err(ChatError::validation("filename must not be empty").into());
        }
        if bytes.is_empty() {
            return Err(ChatError::validation("file is empty").into());
        }
        if !is_supported_file_type(file_type) {
            return Err(ChatError::validation(format!(
                "Unsupported file type: {}",
                file_type
            ))
            .into());
        }

        let chunks = match extract(bytes, file_type)? {
            ExtractedContent::Prose(text) => {
                chunk_text(&text, self.chunking.chunk_size, self.chunking.overlap)
            }
            ExtractedContent::Table { headers, rows } => rows_to_chunks(&headers, &rows),
        };

        if chunks.is_empty() {
            return Err(ChatError::validation(format!(
                "no text could be extracted from {}",
                filename
            ))
            .into());
        }

        let document_id = Uuid::new_v4().to_string();
        let metadata: Vec<serde_json::Value> = (0..chunks.len())
            .map(|i| {
                serde_json::json!({
                    "document_id": document_id,
                    "filename": filename,
                    "chunk_index": i as i64,
                    "file_type": file_type,
                })
            })
            .collect();

        let embeddings = self
            .embeddings
            .embed_many(&chunks)
            .await
            .map_err(|e| ChatError::gateway("embedding", e))?;

        self.index
            .add_chunks(&document_id, &chunks, &embeddings, &metadata)
            .await?;

        let document = Document {
            id: Some(document_id),
            filename: filename.to_string(),
            file_type: file_type.to_string(),
            chunk_count: chunks.len() as i64,
            upload_date: chrono::Utc::now(),
            is_temporary,
        };
        self.documents.save(&document).await?;

        info!(chunks = chunks.len(), "document ingested");
        Ok(document)
    }

    /// Delete a document and all of its indexed chunks. Fails `NotFound`
    /// when the id does not resolve.
    #[instrument(skip(self))]
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        if self.documents.get_by_id(document_id).await?.is_none() {
            return Err(ChatError::not_found("document", document_id).into());
        }

        self.index.delete_document(document_id).await?;
        self.documents.delete(document_id).await?;

        info!("document deleted");
        Ok(())
    }
}
