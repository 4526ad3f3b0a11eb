//! HTTP API server.
//!
//! Exposes the chat, conversation, and document operations as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat/message` | Execute a chat turn |
//! | `POST` | `/conversations` | Create an empty conversation |
//! | `GET`  | `/conversations` | List conversations (most recently active first) |
//! | `GET`  | `/conversations/{id}` | Conversation with its messages |
//! | `DELETE` | `/conversations/{id}` | Delete a conversation and its messages |
//! | `POST` | `/documents/upload` | Multipart upload → ingest |
//! | `GET`  | `/documents` | List ingested documents |
//! | `DELETE` | `/documents/{id}` | Delete a document and its index chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "conversation abc not found" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Validation and not-found errors carry the violated constraint; internal
//! failures are reported generically with no details leaked.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted — the browser frontend
//! is served from a different origin.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use doc_chat_core::chat::ChatEngine;
use doc_chat_core::error::ChatError;
use doc_chat_core::gateway::{AnswerGateway, EmbeddingGateway, QueryExpander};
use doc_chat_core::models::{Conversation, Message, Role, Source};
use doc_chat_core::store::{ConversationStore, DocumentStore, MessageStore};

use crate::config::Config;
use crate::db;
use crate::ingest::IngestPipeline;
use crate::migrate;
use crate::openai::OpenAiGateway;
use crate::sqlite_store::{SqliteConversationStore, SqliteDocumentStore, SqliteMessageStore};
use crate::vector_index::SqliteVectorIndex;

/// Longest accepted chat message, in characters.
const MAX_QUERY_CHARS: usize = 2000;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ChatEngine>,
    ingest: Arc<IngestPipeline>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    documents: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(
        engine: Arc<ChatEngine>,
        ingest: Arc<IngestPipeline>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        AppState {
            engine,
            ingest,
            conversations,
            messages,
            documents,
        }
    }
}

/// Start the HTTP server with SQLite stores and OpenAI-compatible
/// gateways, as configured. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let conversations: Arc<dyn ConversationStore> =
        Arc::new(SqliteConversationStore::new(pool.clone()));
    let messages: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool.clone()));
    let documents: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool.clone()));
    let index = Arc::new(SqliteVectorIndex::new(pool));

    let gateway = Arc::new(OpenAiGateway::new(config.llm.clone())?);
    let embeddings: Arc<dyn EmbeddingGateway> = gateway.clone();
    let answers: Arc<dyn AnswerGateway> = gateway.clone();

    let mut engine = ChatEngine::new(
        embeddings.clone(),
        answers,
        index.clone(),
        conversations.clone(),
        messages.clone(),
        config.chat_config(),
    );
    if config.llm.expand_queries {
        let expander: Arc<dyn QueryExpander> = gateway;
        engine = engine.with_expander(expander);
    }

    let ingest = Arc::new(IngestPipeline::new(
        embeddings,
        index,
        documents.clone(),
        config.chunking.clone(),
    ));

    let state = AppState::new(Arc::new(engine), ingest, conversations, messages, documents);
    let app = router(state);

    println!("doc-chat API listening on http://{}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Separated from [`run_server`] so tests
/// can drive handlers against substitute state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat/message", post(handle_chat_message))
        .route(
            "/conversations",
            post(handle_create_conversation).get(handle_list_conversations),
        )
        .route(
            "/conversations/{id}",
            get(handle_get_conversation).delete(handle_delete_conversation),
        )
        .route("/documents/upload", post(handle_upload_document))
        .route("/documents", get(handle_list_documents))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "error processing request".to_string(),
    }
}

/// Map a pipeline error to an HTTP response. Typed variants pick the
/// status; anything else is an internal failure reported generically.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<ChatError>() {
        Some(ChatError::NotFound { .. }) => not_found(err.to_string()),
        Some(ChatError::Validation(_)) => bad_request(err.to_string()),
        Some(ChatError::Gateway { .. }) | None => {
            error!(error = %err, "request failed");
            internal()
        }
    }
}

// ============ Schemas ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    conversation_id: String,
    sources: Option<Vec<Source>>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ConversationResponse {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationResponse {
    fn from_model(c: &Conversation) -> Self {
        ConversationResponse {
            id: c.id.clone().unwrap_or_default(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Serialize)]
struct ConversationListResponse {
    conversations: Vec<ConversationResponse>,
    total: usize,
}

#[derive(Serialize)]
struct MessageResponse {
    id: String,
    role: Role,
    content: String,
    sources: Option<Vec<Source>>,
    created_at: DateTime<Utc>,
}

impl MessageResponse {
    fn from_model(m: &Message) -> Self {
        MessageResponse {
            id: m.id.clone().unwrap_or_default(),
            role: m.role,
            content: m.content.clone(),
            sources: m.sources.clone(),
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize)]
struct ConversationDetailResponse {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<MessageResponse>,
}

#[derive(Serialize)]
struct DocumentResponse {
    id: String,
    filename: String,
    file_type: String,
    chunk_count: i64,
    upload_date: DateTime<Utc>,
    is_temporary: bool,
}

impl DocumentResponse {
    fn from_model(d: &doc_chat_core::models::Document) -> Self {
        DocumentResponse {
            id: d.id.clone().unwrap_or_default(),
            filename: d.filename.clone(),
            file_type: d.file_type.clone(),
            chunk_count: d.chunk_count,
            upload_date: d.upload_date,
            is_temporary: d.is_temporary,
        }
    }
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentResponse>,
    total: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ============ Handlers ============

async fn handle_chat_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    if message.chars().count() > MAX_QUERY_CHARS {
        return Err(bad_request(format!(
            "message must be at most {} characters",
            MAX_QUERY_CHARS
        )));
    }

    let turn = state
        .engine
        .execute(message, request.conversation_id.as_deref())
        .await
        .map_err(classify_error)?;

    Ok(Json(ChatResponse {
        answer: turn.message.content.clone(),
        conversation_id: turn.conversation_id,
        sources: turn.message.sources,
        created_at: turn.message.created_at,
    }))
}

async fn handle_create_conversation(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ConversationResponse>), AppError> {
    let mut conversation = Conversation::new();
    let id = state
        .conversations
        .save(&conversation)
        .await
        .map_err(classify_error)?;
    conversation.id = Some(id);

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse::from_model(&conversation)),
    ))
}

async fn handle_list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let conversations = state.conversations.list_all().await.map_err(classify_error)?;
    let conversations: Vec<ConversationResponse> = conversations
        .iter()
        .map(ConversationResponse::from_model)
        .collect();
    let total = conversations.len();
    Ok(Json(ConversationListResponse {
        conversations,
        total,
    }))
}

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, AppError> {
    let conversation = state
        .conversations
        .get_by_id(&id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("conversation {} not found", id)))?;

    let messages = state
        .messages
        .get_by_conversation_id(&id)
        .await
        .map_err(classify_error)?;

    Ok(Json(ConversationDetailResponse {
        id,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        messages: messages.iter().map(MessageResponse::from_model).collect(),
    }))
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .conversations
        .get_by_id(&id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("conversation {} not found", id)))?;

    state.conversations.delete(&id).await.map_err(classify_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut is_temporary = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(|s| s.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("unreadable file field: {}", e)))?
                        .to_vec(),
                );
            }
            Some("is_temporary") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable is_temporary field: {}", e)))?;
                is_temporary = value.trim() == "true" || value.trim() == "1";
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("file field with a filename is required"))?;
    let bytes = bytes.ok_or_else(|| bad_request("file field is required"))?;
    let file_type = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let document = state
        .ingest
        .ingest(&filename, &file_type, &bytes, is_temporary)
        .await
        .map_err(classify_error)?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::from_model(&document)),
    ))
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.documents.list_all().await.map_err(classify_error)?;
    let documents: Vec<DocumentResponse> =
        documents.iter().map(DocumentResponse::from_model).collect();
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.ingest.delete(&id).await.map_err(classify_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
