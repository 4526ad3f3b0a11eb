//! OpenAI-compatible gateway implementations.
//!
//! One [`OpenAiGateway`] implements all three gateway traits against an
//! OpenAI-style HTTP API (`/embeddings`, `/chat/completions`). The base
//! URL and model names come from `[llm]` config, the API key from the
//! `OPENAI_API_KEY` environment variable.
//!
//! # Retry Strategy
//!
//! Transient failures use exponential backoff (1s, 2s, 4s, ... capped at
//! 2^5):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - other 4xx (client error) → fail immediately
//! - network errors → retry
//!
//! Retrying lives here, behind the gateway trait — callers never retry.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use doc_chat_core::gateway::{AnswerGateway, EmbeddingGateway, QueryExpander};

use crate::config::LlmConfig;

/// Default system prompt for answer generation.
const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant that answers questions about the user's uploaded documents. \
Answer using only the information in the provided context. If the context does not \
contain the answer, say so clearly instead of guessing. When the context is empty, \
respond conversationally and suggest uploading relevant documents. Be precise and \
concise, and quote figures exactly as they appear.";

/// System prompt for the query-expansion step.
const EXPANSION_SYSTEM_PROMPT: &str = "You expand search queries for semantic retrieval over business documents. \
Keep the original query first, then add two or three closely related terms or \
synonyms, separated by commas. Output only the expanded query, no explanations.";

pub struct OpenAiGateway {
    http: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiGateway {
    /// Build a gateway from config. Fails when `OPENAI_API_KEY` is not in
    /// the environment.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenAiGateway {
            http,
            api_key,
            config,
        })
    }

    async fn post_with_retry(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json().await?);
                    }
                    let text = resp.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("{} returned {}: {}", path, status, text));
                        continue;
                    }
                    bail!("{} returned {}: {}", path, status, text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} failed with no attempts made", path)))
    }

    async fn chat_completion(&self, messages: serde_json::Value) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.chat_model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": 1000,
        });

        let raw = self.post_with_retry("/chat/completions", &body).await?;
        let parsed: ChatCompletionResponse = serde_json::from_value(raw)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("chat completion returned no choices"))?
            .message
            .content
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl EmbeddingGateway for OpenAiGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("empty embedding response"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": texts,
        });

        let raw = self.post_with_retry("/embeddings", &body).await?;
        let parsed: EmbeddingResponse = serde_json::from_value(raw)?;
        if parsed.data.len() != texts.len() {
            bail!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            );
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl AnswerGateway for OpenAiGateway {
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let context_text = if context.is_empty() {
            "No context available.".to_string()
        } else {
            context.join("\n\n---\n\n")
        };

        let user_content = format!(
            "Document context:\n\n{}\n\n---\n\nUser question: {}\n\nAnswer based only on the context above.",
            context_text, query
        );

        let messages = serde_json::json!([
            {"role": "system", "content": system_prompt.unwrap_or(ANSWER_SYSTEM_PROMPT)},
            {"role": "user", "content": user_content},
        ]);

        self.chat_completion(messages).await
    }
}

#[async_trait]
impl QueryExpander for OpenAiGateway {
    async fn expand(&self, query: &str) -> Result<String> {
        let messages = serde_json::json!([
            {"role": "system", "content": EXPANSION_SYSTEM_PROMPT},
            {"role": "user", "content": query},
        ]);

        self.chat_completion(messages).await
    }
}
