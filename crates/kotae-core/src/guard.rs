//! # Duplicate Guard
//!
//! Near-duplicate detection for new knowledge-base entries. Duplicate
//! detection and retrieval are the same similarity computation, so the
//! guard is the matcher run at a high threshold against the current index.

use tracing::info;

use crate::error::{KotaeError, Result};
use crate::matcher::Matcher;
use crate::store::EntryStore;
use crate::types::MatchCandidate;

impl<S: EntryStore> Matcher<S> {
    /// Returns the existing entry `question` would duplicate, if any.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn would_duplicate(&self, question: &str) -> Result<Option<MatchCandidate>> {
        self.would_duplicate_with_embedding(question, None)
    }

    /// [`Matcher::would_duplicate`] with an optional embedding of the new
    /// question.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn would_duplicate_with_embedding(
        &self,
        question: &str,
        embedding: Option<&[f32]>,
    ) -> Result<Option<MatchCandidate>> {
        self.best_answer_with_embedding(question, embedding, self.config().duplicate_threshold)
    }

    /// Rejects `question` with `KotaeError::DuplicateQuestion` if it
    /// duplicates an existing entry.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::DuplicateQuestion` carrying the conflicting
    /// entry id and confidence, or a store error from the lazy first build.
    pub fn ensure_unique(&self, question: &str, embedding: Option<&[f32]>) -> Result<()> {
        match self.would_duplicate_with_embedding(question, embedding)? {
            Some(candidate) => {
                info!(
                    existing = %candidate.entry_id,
                    confidence = candidate.confidence,
                    tier = %candidate.tier,
                    "rejected duplicate question"
                );
                Err(KotaeError::DuplicateQuestion {
                    existing: candidate.entry_id,
                    confidence: candidate.confidence,
                })
            }
            None => Ok(()),
        }
    }
}
