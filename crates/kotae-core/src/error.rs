use thiserror::Error;

use crate::types::EntryId;

/// Errors that can occur during Kotae core operations.
#[derive(Debug, Error)]
pub enum KotaeError {
    /// A new or edited entry is too similar to one already in the knowledge base.
    #[error("similar question already exists in knowledge base: {existing} (confidence {confidence:.2})")]
    DuplicateQuestion {
        /// The entry the new question collides with.
        existing: EntryId,
        /// Matcher confidence for the collision.
        confidence: f32,
    },

    /// No entry exists with the given id.
    #[error("knowledge base entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The entry violates a data-model invariant (e.g. empty question).
    #[error("invalid knowledge base entry: {0}")]
    InvalidEntry(String),

    /// The embedding tier cannot serve this request.
    #[error("embedding tier unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A freshly built index disagrees with the entry set it was built from.
    #[error("inconsistent index state: {0}")]
    InconsistentIndexState(String),

    /// The backing entry store failed.
    #[error("entry store error: {0}")]
    Store(String),

    /// A knowledge-base file could not be decoded.
    #[error("failed to decode knowledge base: {0}")]
    Decode(#[from] serde_json::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),
}

/// Result type alias for Kotae operations.
pub type Result<T> = std::result::Result<T, KotaeError>;
