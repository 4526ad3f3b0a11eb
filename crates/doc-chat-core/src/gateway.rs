//! Gateways to external language-model services.
//!
//! These traits are the orchestrator's only view of the embedding and
//! completion models. Implementations live in the app crate (HTTP calls
//! to an OpenAI-compatible API); tests substitute scripted fakes.
//!
//! Gateway failures are fatal to the turn that triggered them. Retry
//! policy, if any, belongs to the implementation behind the trait — the
//! orchestrator never retries.

use anyhow::Result;
use async_trait::async_trait;

/// Converts text into fixed-length embedding vectors.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a single text (e.g. a chat query).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. The result is order-preserving and 1:1
    /// with the input.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Generates a natural-language answer from a query and assembled context.
///
/// An empty context list is a valid input: the model is expected to
/// answer conversationally or decline on its own.
#[async_trait]
pub trait AnswerGateway: Send + Sync {
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        system_prompt: Option<&str>,
    ) -> Result<String>;
}

/// Optional query rewriting before embedding: synonyms, translations,
/// related terms. Failures are recovered by the caller with the original
/// query — expansion is an optimization, never a requirement.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<String>;
}
