//! Chat turn orchestration: retrieval, context assembly, and persistence.
//!
//! [`ChatEngine`] turns a raw user query plus a conversation handle into
//! an answered, durably recorded turn:
//!
//! 1. Resolve the conversation (create lazily, or fail `NotFound`).
//! 2. Persist the user message **before** retrieval, so a crash later in
//!    the turn still leaves a record of what was asked.
//! 3. Load prior messages and keep the most recent `history_limit`.
//! 4. Embed the query (optionally expanded first), search the vector
//!    index, and keep hits whose similarity clears `min_relevance`.
//! 5. Pick exactly one context: document evidence, rendered history, or
//!    nothing — the generator is invoked in all three cases.
//! 6. Persist the assistant message (with sources only when document
//!    evidence was used) and touch the conversation's `updated_at`.
//!
//! No state survives across turns except what the stores hold. The engine
//! takes every collaborator at construction — no globals — so tests run
//! it against in-memory stores and scripted gateways.
//!
//! There is deliberately no transaction spanning the vector index and the
//! relational store: they are separate systems, and the user-message-first
//! write order is the compensation strategy.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::error::ChatError;
use crate::gateway::{AnswerGateway, EmbeddingGateway, QueryExpander};
use crate::models::{Conversation, Message, Source};
use crate::store::{ConversationStore, MessageStore, VectorIndex};

/// Number of chunk characters kept in a [`Source`] preview.
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Header prefixed to rendered history when it stands in for document
/// evidence.
pub const HISTORY_CONTEXT_HEADER: &str =
    "Previous conversation (no matching documents were found):";

/// Fixed reply when the generator succeeds but returns empty content.
pub const EMPTY_ANSWER_FALLBACK: &str =
    "I wasn't able to come up with an answer to that. Could you rephrase your question?";

/// Retrieval tuning for the chat engine.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Nearest chunks fetched per query.
    pub top_k: usize,
    /// Hard similarity cutoff; hits below it are dropped. Hits with no
    /// reported distance bypass the filter entirely.
    pub min_relevance: f64,
    /// Prior messages kept when rendering history (oldest dropped first).
    pub history_limit: usize,
    /// Override for the generator's system prompt.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            top_k: 5,
            min_relevance: 0.3,
            history_limit: 10,
            system_prompt: None,
        }
    }
}

/// A completed chat turn: the persisted assistant message and the id of
/// the conversation it belongs to (newly created when the caller supplied
/// none).
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub message: Message,
    pub conversation_id: String,
}

/// The retrieval orchestrator. One instance serves many concurrent turns;
/// it holds no per-turn state.
pub struct ChatEngine {
    embeddings: Arc<dyn EmbeddingGateway>,
    answers: Arc<dyn AnswerGateway>,
    expander: Option<Arc<dyn QueryExpander>>,
    index: Arc<dyn VectorIndex>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    config: ChatConfig,
}

impl ChatEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingGateway>,
        answers: Arc<dyn AnswerGateway>,
        index: Arc<dyn VectorIndex>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        config: ChatConfig,
    ) -> Self {
        ChatEngine {
            embeddings,
            answers,
            expander: None,
            index,
            conversations,
            messages,
            config,
        }
    }

    /// Attach an optional query expander. Expansion failures never fail a
    /// turn; the original query is used instead.
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Execute one chat turn.
    ///
    /// With `conversation_id == None` a new conversation is created and
    /// its id returned in the [`ChatTurn`]. A supplied id that resolves
    /// to nothing fails with [`ChatError::NotFound`] before anything is
    /// written.
    #[instrument(skip(self, query), fields(conversation = conversation_id.unwrap_or("new")))]
    pub async fn execute(&self, query: &str, conversation_id: Option<&str>) -> Result<ChatTurn> {
        let (conversation, conversation_id) = self.resolve_conversation(conversation_id).await?;

        // The user turn is committed before retrieval begins: a failure
        // anywhere below still leaves the question on record.
        let user_message_id = self
            .messages
            .save(&Message::user(query), &conversation_id)
            .await?;

        let history = self.load_history(&conversation_id, &user_message_id).await?;

        let (context, sources) = self.gather_evidence(query).await?;
        debug!(
            evidence = context.len(),
            history = history.len(),
            "context assembled"
        );

        // Exactly one branch applies: evidence, history, or nothing.
        let (context, sources) = if !context.is_empty() {
            (context, Some(sources))
        } else if !history.is_empty() {
            let rendered = format!("{}\n{}", HISTORY_CONTEXT_HEADER, history.join("\n"));
            (vec![rendered], None)
        } else {
            (Vec::new(), None)
        };

        let answer = self
            .answers
            .generate(query, &context, self.config.system_prompt.as_deref())
            .await
            .map_err(|e| ChatError::gateway("generation", e))?;

        // A present-but-empty response is recovered with a fixed reply;
        // a raised error above is not.
        let answer = if answer.trim().is_empty() {
            warn!("generator returned empty content");
            EMPTY_ANSWER_FALLBACK.to_string()
        } else {
            answer
        };

        let mut assistant = Message::assistant(answer, sources);
        let assistant_id = self.messages.save(&assistant, &conversation_id).await?;
        assistant.id = Some(assistant_id);

        let mut touched = conversation;
        touched.updated_at = Utc::now();
        self.conversations.update(&touched).await?;

        Ok(ChatTurn {
            message: assistant,
            conversation_id,
        })
    }

    /// Fetch the conversation for this turn, creating one when the caller
    /// supplied no id.
    async fn resolve_conversation(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<(Conversation, String)> {
        match conversation_id {
            Some(id) => {
                let conversation = self
                    .conversations
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| ChatError::not_found("conversation", id))?;
                Ok((conversation, id.to_string()))
            }
            None => {
                let mut conversation = Conversation::new();
                let id = self.conversations.save(&conversation).await?;
                conversation.id = Some(id.clone());
                Ok((conversation, id))
            }
        }
    }

    /// Prior messages rendered as `"ROLE: content"`, trimmed to the most
    /// recent `history_limit` entries, oldest first. The just-persisted
    /// user message is excluded — it is the query, not history.
    async fn load_history(
        &self,
        conversation_id: &str,
        exclude_message_id: &str,
    ) -> Result<Vec<String>> {
        let rendered: Vec<String> = self
            .messages
            .get_by_conversation_id(conversation_id)
            .await?
            .iter()
            .filter(|m| m.id.as_deref() != Some(exclude_message_id))
            .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
            .collect();

        let keep_from = rendered.len().saturating_sub(self.config.history_limit);
        Ok(rendered[keep_from..].to_vec())
    }

    /// Embed the query, search the index, and build the relevance-filtered
    /// evidence set: full chunk texts as context, bounded previews as
    /// sources. Index order is trusted; ties are not re-sorted.
    async fn gather_evidence(&self, query: &str) -> Result<(Vec<String>, Vec<Source>)> {
        let embed_input = self.expand_query(query).await;
        let query_embedding = self
            .embeddings
            .embed(&embed_input)
            .await
            .map_err(|e| ChatError::gateway("embedding", e))?;

        let hits = self.index.search(&query_embedding, self.config.top_k).await?;

        let mut context = Vec::new();
        let mut sources = Vec::new();
        for hit in hits {
            let relevance = hit.distance.map(|d| 1.0 - d);
            // No distance means the index could not score the hit; that is
            // not the same as scoring zero, so such hits are kept.
            if let Some(score) = relevance {
                if score < self.config.min_relevance {
                    continue;
                }
            }

            sources.push(Source {
                document_id: metadata_str(&hit.metadata, "document_id"),
                filename: metadata_str(&hit.metadata, "filename"),
                chunk_index: hit
                    .metadata
                    .get("chunk_index")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0),
                content: preview(&hit.document_text),
                relevance_score: relevance,
            });
            context.push(hit.document_text);
        }

        Ok((context, sources))
    }

    /// Run the optional expansion step; any failure or empty result falls
    /// back to the original query.
    async fn expand_query(&self, query: &str) -> String {
        let Some(expander) = &self.expander else {
            return query.to_string();
        };
        match expander.expand(query).await {
            Ok(expanded) if !expanded.trim().is_empty() => expanded,
            Ok(_) => {
                warn!("query expansion returned empty text, using original query");
                query.to_string()
            }
            Err(err) => {
                warn!(error = %err, "query expansion failed, using original query");
                query.to_string()
            }
        }
    }
}

/// String field from hit metadata, defaulting to `"unknown"`. Missing
/// metadata never fails a turn.
fn metadata_str(metadata: &serde_json::Value, key: &str) -> String {
    metadata
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Bounded chunk preview stored in a [`Source`].
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}
