use thiserror::Error;
use ulid::Ulid;

use crate::model::ModelError;
use crate::store::StoreError;

/// Caller-facing failure of one engine operation. Every variant is scoped to
/// the request that produced it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// The slot overlaps the occupied interval with this id, found either by
    /// the pre-write check or by the store rejecting the write.
    #[error("slot conflicts with {0}")]
    Conflict(Ulid),
    #[error("quote amounts do not match the pricing rules")]
    QuoteMismatch,
    #[error("not found: {0}")]
    NotFound(Ulid),
    /// Occupancy or booking store unreachable or too slow. Says nothing about
    /// availability; retry.
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl EngineError {
    /// Short machine-readable tag, used on the wire and as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::LimitExceeded(_) => "limit",
            EngineError::Conflict(_) => "conflict",
            EngineError::QuoteMismatch => "quote_mismatch",
            EngineError::NotFound(_) => "not_found",
            EngineError::Transient(_) => "transient",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::LimitExceeded(_) | EngineError::QuoteMismatch
        )
    }
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(id) => EngineError::Conflict(id),
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Invalid(msg) => EngineError::Validation(msg.to_string()),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            StoreError::Unavailable(msg) => EngineError::Transient(msg),
        }
    }
}
