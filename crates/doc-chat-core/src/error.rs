//! Error taxonomy for the chat pipeline.
//!
//! Application code composes errors with `anyhow`; the variants here are
//! the ones callers need to tell apart. The HTTP boundary downcasts
//! `anyhow::Error` to [`ChatError`] to pick a status code — everything
//! else is a generic server failure.

use thiserror::Error;

/// Errors with distinct recovery behavior at the call boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A referenced entity does not exist. Client error, never retried.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input. Surfaced immediately with the violated constraint.
    #[error("{0}")]
    Validation(String),

    /// An external model call failed. Fatal to the turn; prior writes in
    /// the same turn are not rolled back.
    #[error("{gateway} gateway error: {message}")]
    Gateway {
        gateway: &'static str,
        message: String,
    },
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ChatError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn gateway(gateway: &'static str, err: impl std::fmt::Display) -> Self {
        ChatError::Gateway {
            gateway,
            message: err.to_string(),
        }
    }
}
