//! # doc-chat
//!
//! **A retrieval-augmented document chat backend.**
//!
//! Users upload documents (PDF, CSV, XLSX, plain text); the backend
//! extracts and indexes their content as embedded chunks, and a chat API
//! answers natural-language questions by retrieving relevant chunks and
//! synthesizing an answer through an OpenAI-compatible model, preserving
//! multi-turn conversation context and citing its sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Upload  │──▶│   Pipeline    │──▶│    SQLite     │
//! │ PDF/CSV/ │   │ Extract+Chunk │   │ vector_chunks │
//! │   XLSX   │   │    +Embed     │   │ conversations │
//! └──────────┘   └───────────────┘   └──────┬────────┘
//!                                           │
//!                  ┌────────────────────────┤
//!                  ▼                        ▼
//!            ┌───────────┐          ┌──────────────┐
//!            │ ChatEngine │◀────────│  HTTP / CLI  │
//!            │ (retrieval │         │   (axum /    │
//!            │ + answer)  │         │   docchat)   │
//!            └───────────┘          └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. Uploaded bytes are turned into prose or rows by [`extract`].
//! 2. The ingestion pipeline ([`ingest`]) chunks the content, embeds every
//!    chunk through the configured gateway, and writes them to the vector
//!    index with document metadata.
//! 3. A chat turn embeds the query, retrieves the nearest chunks, filters
//!    them by relevance, and falls back to conversation history when no
//!    evidence is found (`doc_chat_core::chat`).
//! 4. Every turn is durably recorded as a user/assistant message pair with
//!    optional source citations ([`sqlite_store`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`extract`] | PDF / CSV / XLSX / text extraction |
//! | [`ingest`] | Ingestion pipeline: extract → chunk → embed → index |
//! | [`openai`] | OpenAI-compatible embedding, answer, and expansion gateways |
//! | [`sqlite_store`] | SQLite conversation, message, and document stores |
//! | [`vector_index`] | SQLite vector index (BLOB embeddings, cosine scan) |
//! | [`server`] | JSON HTTP API (Axum) with permissive CORS |
//!
//! The domain core — models, chunking, store traits, and the chat
//! orchestrator — lives in the `doc-chat-core` crate.

pub mod config;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod openai;
pub mod server;
pub mod sqlite_store;
pub mod vector_index;
