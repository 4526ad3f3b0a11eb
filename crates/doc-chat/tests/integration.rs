//! Integration tests over a real SQLite database.
//!
//! Gateways are stubbed (no network); everything below them — stores,
//! vector index, ingestion, chat turns — runs against a temporary
//! database file.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;

use doc_chat::config::ChunkingConfig;
use doc_chat::db;
use doc_chat::ingest::IngestPipeline;
use doc_chat::migrate;
use doc_chat::sqlite_store::{
    SqliteConversationStore, SqliteDocumentStore, SqliteMessageStore,
};
use doc_chat::vector_index::SqliteVectorIndex;
use doc_chat_core::chat::{ChatConfig, ChatEngine};
use doc_chat_core::error::ChatError;
use doc_chat_core::gateway::{AnswerGateway, EmbeddingGateway};
use doc_chat_core::models::{Conversation, Document, Message, Role, Source};
use doc_chat_core::store::{
    ConversationStore, DocumentStore, MessageStore, VectorIndex,
};

async fn test_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("doc-chat.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, pool)
}

/// Deterministic fake embeddings: direction depends on whether the text
/// mentions "revenue", so searches can separate the two topics.
struct StubEmbeddings;

#[async_trait]
impl EmbeddingGateway for StubEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(if text.to_lowercase().contains("revenue") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        })
    }
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

struct StubAnswers;

#[async_trait]
impl AnswerGateway for StubAnswers {
    async fn generate(&self, _: &str, context: &[String], _: Option<&str>) -> Result<String> {
        Ok(format!("answered from {} context entries", context.len()))
    }
}

struct FailingAnswers;

#[async_trait]
impl AnswerGateway for FailingAnswers {
    async fn generate(&self, _: &str, _: &[String], _: Option<&str>) -> Result<String> {
        Err(anyhow::anyhow!("model backend down"))
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (_tmp, pool) = test_pool().await;
    migrate::run_migrations(&pool).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
}

#[tokio::test]
async fn conversation_roundtrip_and_listing_order() {
    let (_tmp, pool) = test_pool().await;
    let store = SqliteConversationStore::new(pool);

    let mut first = Conversation::new();
    first.updated_at = Utc::now() - chrono::Duration::minutes(10);
    first.created_at = first.updated_at;
    let first_id = store.save(&first).await.unwrap();

    let second_id = store.save(&Conversation::new()).await.unwrap();

    let fetched = store.get_by_id(&first_id).await.unwrap().unwrap();
    assert_eq!(fetched.id.as_deref(), Some(first_id.as_str()));
    assert!(store.get_by_id("nope").await.unwrap().is_none());

    // Most recently updated first.
    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id.as_deref(), Some(second_id.as_str()));

    // Touching the older one moves it to the front.
    let mut touched = fetched;
    touched.updated_at = Utc::now() + chrono::Duration::seconds(5);
    store.update(&touched).await.unwrap();
    let all = store.list_all().await.unwrap();
    assert_eq!(all[0].id.as_deref(), Some(first_id.as_str()));
}

#[tokio::test]
async fn deleting_a_conversation_cascades_to_messages() {
    let (_tmp, pool) = test_pool().await;
    let conversations = SqliteConversationStore::new(pool.clone());
    let messages = SqliteMessageStore::new(pool);

    let id = conversations.save(&Conversation::new()).await.unwrap();
    messages.save(&Message::user("q"), &id).await.unwrap();
    messages
        .save(&Message::assistant("a", None), &id)
        .await
        .unwrap();

    conversations.delete(&id).await.unwrap();
    assert!(conversations.get_by_id(&id).await.unwrap().is_none());
    assert!(messages.get_by_conversation_id(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn message_sources_distinguish_none_from_some() {
    let (_tmp, pool) = test_pool().await;
    let conversations = SqliteConversationStore::new(pool.clone());
    let messages = SqliteMessageStore::new(pool);
    let id = conversations.save(&Conversation::new()).await.unwrap();

    let source = Source {
        document_id: "doc-1".to_string(),
        filename: "report.pdf".to_string(),
        chunk_index: 3,
        content: "preview...".to_string(),
        relevance_score: Some(0.92),
    };
    messages.save(&Message::user("question"), &id).await.unwrap();
    messages
        .save(&Message::assistant("cited answer", Some(vec![source.clone()])), &id)
        .await
        .unwrap();
    messages
        .save(&Message::assistant("history answer", None), &id)
        .await
        .unwrap();

    let loaded = messages.get_by_conversation_id(&id).await.unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0].role, Role::User);
    assert!(loaded[0].sources.is_none());
    assert_eq!(loaded[1].sources.as_deref(), Some(&[source][..]));
    assert!(loaded[2].sources.is_none(), "None must not come back as []");
}

#[tokio::test]
async fn messages_keep_insertion_order_within_one_timestamp() {
    let (_tmp, pool) = test_pool().await;
    let messages = SqliteMessageStore::new(pool);

    let now = Utc::now();
    for i in 0..5 {
        let mut m = Message::user(format!("m{}", i));
        m.created_at = now;
        messages.save(&m, "c1").await.unwrap();
    }

    let loaded = messages.get_by_conversation_id("c1").await.unwrap();
    let contents: Vec<&str> = loaded.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
}

#[tokio::test]
async fn document_store_roundtrip_and_delete() {
    let (_tmp, pool) = test_pool().await;
    let store = SqliteDocumentStore::new(pool);

    let mut doc = Document::new("report.pdf", "pdf");
    doc.chunk_count = 7;
    doc.is_temporary = true;
    let id = store.save(&doc).await.unwrap();

    let fetched = store.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(fetched.filename, "report.pdf");
    assert_eq!(fetched.chunk_count, 7);
    assert!(fetched.is_temporary);

    store.delete(&id).await.unwrap();
    assert!(store.get_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn vector_index_search_orders_by_distance() {
    let (_tmp, pool) = test_pool().await;
    let index = SqliteVectorIndex::new(pool);

    assert!(index.search(&[1.0, 0.0], 5).await.unwrap().is_empty());

    index
        .add_chunks(
            "doc-1",
            &["revenue chunk".to_string(), "staffing chunk".to_string()],
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
            &[
                serde_json::json!({"document_id": "doc-1", "filename": "a.csv", "chunk_index": 0}),
                serde_json::json!({"document_id": "doc-1", "filename": "a.csv", "chunk_index": 1}),
            ],
        )
        .await
        .unwrap();

    let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_text, "revenue chunk");
    assert!(hits[0].distance.unwrap() < hits[1].distance.unwrap());
    assert_eq!(hits[0].metadata["chunk_index"], 0);

    let top_one = index.search(&[1.0, 0.0], 1).await.unwrap();
    assert_eq!(top_one.len(), 1);
}

#[tokio::test]
async fn vector_index_rejects_mismatched_input_lengths() {
    let (_tmp, pool) = test_pool().await;
    let index = SqliteVectorIndex::new(pool);

    let err = index
        .add_chunks(
            "doc-1",
            &["only chunk".to_string()],
            &[],
            &[serde_json::json!({})],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::Validation(_))
    ));
}

#[tokio::test]
async fn vector_index_delete_document_removes_its_chunks() {
    let (_tmp, pool) = test_pool().await;
    let index = SqliteVectorIndex::new(pool);

    for doc in ["doc-a", "doc-b"] {
        index
            .add_chunks(
                doc,
                &[format!("chunk of {}", doc)],
                &[vec![1.0, 0.0]],
                &[serde_json::json!({"document_id": doc})],
            )
            .await
            .unwrap();
    }

    index.delete_document("doc-a").await.unwrap();
    let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata["document_id"], "doc-b");
}

fn pipeline(pool: &SqlitePool) -> IngestPipeline {
    IngestPipeline::new(
        Arc::new(StubEmbeddings),
        Arc::new(SqliteVectorIndex::new(pool.clone())),
        Arc::new(SqliteDocumentStore::new(pool.clone())),
        ChunkingConfig::default(),
    )
}

#[tokio::test]
async fn csv_ingestion_produces_one_chunk_per_row() {
    let (_tmp, pool) = test_pool().await;
    let csv = b"customer,revenue\nAcme,1200\nGlobex,\nInitech,800\n";

    let document = pipeline(&pool)
        .ingest("sales.csv", "csv", csv, false)
        .await
        .unwrap();
    // The all-but-empty Globex row still has a customer cell, so three
    // rows yield three chunks.
    assert_eq!(document.chunk_count, 3);

    let documents = SqliteDocumentStore::new(pool.clone());
    let listed = documents.list_all().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "sales.csv");

    let index = SqliteVectorIndex::new(pool);
    let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().any(|h| h.document_text == "customer: Acme | revenue: 1200"));
    for hit in &hits {
        assert_eq!(hit.metadata["filename"], "sales.csv");
    }
}

#[tokio::test]
async fn text_ingestion_chunks_prose() {
    let (_tmp, pool) = test_pool().await;
    let body = "Quarterly revenue grew by twelve percent. Expenses stayed flat. ".repeat(40);

    let document = pipeline(&pool)
        .ingest("notes.txt", "txt", body.as_bytes(), false)
        .await
        .unwrap();
    assert!(document.chunk_count > 1);
}

#[tokio::test]
async fn unsupported_and_empty_uploads_are_validation_errors() {
    let (_tmp, pool) = test_pool().await;
    let p = pipeline(&pool);

    let err = p.ingest("x.docx", "docx", b"data", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::Validation(_))
    ));

    let err = p.ingest("x.txt", "txt", b"", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::Validation(_))
    ));

    // Nothing was written by the failed attempts.
    let documents = SqliteDocumentStore::new(pool);
    assert!(documents.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_document_clears_both_stores() {
    let (_tmp, pool) = test_pool().await;
    let p = pipeline(&pool);

    let document = p
        .ingest("sales.csv", "csv", b"customer,revenue\nAcme,1\n", false)
        .await
        .unwrap();
    let id = document.id.unwrap();

    p.delete(&id).await.unwrap();

    let documents = SqliteDocumentStore::new(pool.clone());
    assert!(documents.get_by_id(&id).await.unwrap().is_none());
    let index = SqliteVectorIndex::new(pool);
    assert!(index.search(&[1.0, 0.0], 10).await.unwrap().is_empty());

    let err = p.delete(&id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::NotFound { .. })
    ));
}

fn engine(pool: &SqlitePool, answers: Arc<dyn AnswerGateway>) -> ChatEngine {
    ChatEngine::new(
        Arc::new(StubEmbeddings),
        answers,
        Arc::new(SqliteVectorIndex::new(pool.clone())),
        Arc::new(SqliteConversationStore::new(pool.clone())),
        Arc::new(SqliteMessageStore::new(pool.clone())),
        ChatConfig {
            min_relevance: 0.5,
            ..ChatConfig::default()
        },
    )
}

#[tokio::test]
async fn chat_turn_over_sqlite_cites_ingested_evidence() {
    let (_tmp, pool) = test_pool().await;
    pipeline(&pool)
        .ingest(
            "sales.csv",
            "csv",
            b"customer,revenue\nAcme,1200\nGlobex,900\n",
            false,
        )
        .await
        .unwrap();

    let engine = engine(&pool, Arc::new(StubAnswers));
    let turn = engine
        .execute("what was the revenue?", None)
        .await
        .unwrap();

    let sources = turn.message.sources.expect("evidence must be cited");
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s.filename == "sales.csv"));

    // The turn is durably recorded: user + assistant, with citations on
    // the assistant row only.
    let messages = SqliteMessageStore::new(pool);
    let persisted = messages
        .get_by_conversation_id(&turn.conversation_id)
        .await
        .unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].role, Role::User);
    assert!(persisted[0].sources.is_none());
    assert_eq!(persisted[1].role, Role::Assistant);
    assert!(persisted[1].sources.is_some());
}

#[tokio::test]
async fn failed_generation_still_leaves_the_question_on_record() {
    let (_tmp, pool) = test_pool().await;

    let conversations = SqliteConversationStore::new(pool.clone());
    let id = conversations.save(&Conversation::new()).await.unwrap();

    let engine = engine(&pool, Arc::new(FailingAnswers));
    let err = engine
        .execute("what was the revenue?", Some(&id))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::Gateway { .. })
    ));

    let messages = SqliteMessageStore::new(pool);
    let persisted = messages.get_by_conversation_id(&id).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "what was the revenue?");
}

#[tokio::test]
async fn chat_turn_with_unknown_conversation_is_not_found() {
    let (_tmp, pool) = test_pool().await;
    let engine = engine(&pool, Arc::new(StubAnswers));

    let err = engine
        .execute("hello", Some("missing"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChatError>(),
        Some(ChatError::NotFound { .. })
    ));
}
