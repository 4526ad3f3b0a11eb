//! SQLite-backed vector index.
//!
//! Embeddings are stored as little-endian `f32` BLOBs in the
//! `vector_chunks` table; search is a brute-force cosine scan over all
//! stored vectors, reporting `distance = 1 − cosine_similarity`. Fine for
//! the corpus sizes this backend targets — the trait seam is where an ANN
//! engine would slot in.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use doc_chat_core::error::ChatError;
use doc_chat_core::store::{SearchHit, VectorIndex};
use doc_chat_core::vector::{blob_to_vec, cosine_distance, vec_to_blob};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
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

        let mut tx = self.pool.begin().await?;

        for (i, text) in chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO vector_chunks (id, document_id, chunk_index, text, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(format!("{}_chunk_{}", document_id, i))
            .bind(document_id)
            .bind(i as i64)
            .bind(text)
            .bind(serde_json::to_string(&metadata[i])?)
            .bind(vec_to_blob(&embeddings[i]))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM vector_chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                let metadata = serde_json::from_str(&metadata_json)
                    .unwrap_or_else(|_| serde_json::json!({}));
                SearchHit {
                    id: row.get("id"),
                    document_text: row.get("text"),
                    metadata,
                    distance: Some(cosine_distance(query_embedding, &blob_to_vec(&blob))),
                }
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
        sqlx::query("DELETE FROM vector_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
