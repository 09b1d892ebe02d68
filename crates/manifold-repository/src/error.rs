//! Repository error types.

use thiserror::Error;

use crate::esl::EslError;
use crate::locks::{self, BlockingLock};
use crate::transformer::EventType;

/// Errors that can occur while applying transformers.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("locked: {}", locks::describe(.locks))]
    Locked { locks: Vec<BlockingLock> },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("state store error: {0}")]
    Storage(#[from] manifold_state::StateError),

    #[error("event log decode error: {0}")]
    Decode(#[from] EslError),

    #[error("transformer #{index} ({event_type}) failed: {source}")]
    Transformer {
        index: usize,
        event_type: EventType,
        source: Box<RepositoryError>,
    },

    #[error("deadline exceeded after {applied} transformers")]
    DeadlineExceeded { applied: usize },
}

impl RepositoryError {
    /// Whether retrying the same request can succeed without outside changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(_) | Self::DeadlineExceeded { .. } => true,
            Self::Transformer { source, .. } => source.is_retryable(),
            Self::Locked { .. } | Self::Validation(_) | Self::Decode(_) => false,
        }
    }

    /// The underlying error, past any batch position wrapper.
    pub fn root(&self) -> &RepositoryError {
        match self {
            Self::Transformer { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;
