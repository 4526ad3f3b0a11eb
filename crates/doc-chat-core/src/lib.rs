//! # Doc Chat Core
//!
//! Shared, WASM-safe logic for doc-chat: data models, chunking, store
//! abstractions, gateway traits, and the chat orchestration algorithm.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Concrete store and gateway implementations
//! (SQLite, OpenAI-compatible HTTP) live in the `doc-chat` app crate;
//! the in-memory store implementations here exist for tests and
//! embedded use.

pub mod chat;
pub mod chunk;
pub mod error;
pub mod gateway;
pub mod models;
pub mod store;
pub mod vector;
