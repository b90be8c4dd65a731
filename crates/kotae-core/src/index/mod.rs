//! # Search Index
//!
//! The derived, rebuildable state the matcher queries: exact-match lookup,
//! embedding index and lexical index, all built from one snapshot of the
//! active entry set. A `SearchIndex` is immutable once built; mutations
//! produce a new one.

pub mod embedding;
pub mod exact;
pub mod lexical;

use std::collections::HashMap;

use tracing::warn;

use crate::error::{KotaeError, Result};
use crate::types::{EntryId, KnowledgeEntry};

pub use embedding::{cosine_similarity, EmbeddingIndex, SimilarityScale};
pub use exact::ExactIndex;
pub use lexical::LexicalIndex;

/// All three tiers built over the same active entry set.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    pub(crate) exact: ExactIndex,
    pub(crate) embedding: EmbeddingIndex,
    pub(crate) lexical: LexicalIndex,
    entries: HashMap<EntryId, KnowledgeEntry>,
    generation: u64,
}

impl SearchIndex {
    /// Builds every tier from `entries`. Inactive entries are ignored.
    ///
    /// Active entries that violate the data-model invariants are skipped
    /// with a warning. The embedding tier takes the dimension most entries
    /// share (ties go to the one seen first); an entry whose embedding does
    /// not fit stays searchable through the exact and lexical tiers.
    #[must_use]
    pub fn build(entries: &[KnowledgeEntry], scale: SimilarityScale, generation: u64) -> Self {
        let active: Vec<KnowledgeEntry> = entries
            .iter()
            .filter(|e| e.active)
            .filter(|e| match e.validate() {
                Ok(()) => true,
                Err(err) => {
                    warn!(entry = %e.id, error = %err, "skipping invalid entry during index build");
                    false
                }
            })
            .cloned()
            .collect();

        let dimension = majority_dimension(active.iter().filter_map(|e| e.embedding.as_deref()));
        let mut embedding = EmbeddingIndex::new(scale);
        let mut mismatched = 0usize;
        for entry in &active {
            let Some(vector) = &entry.embedding else {
                continue;
            };
            if Some(vector.len()) != dimension {
                mismatched += 1;
                continue;
            }
            if let Err(err) = embedding.upsert(entry.id.clone(), vector.clone()) {
                warn!(entry = %entry.id, error = %err, "entry left out of embedding tier");
            }
        }
        if mismatched > 0 {
            warn!(
                mismatched,
                dimension = ?dimension,
                "embeddings with a minority dimension left out of embedding tier"
            );
        }

        let exact = ExactIndex::build(&active);
        let lexical = LexicalIndex::build(&active);
        let entries = active.into_iter().map(|e| (e.id.clone(), e)).collect();

        Self {
            exact,
            embedding,
            lexical,
            entries,
            generation,
        }
    }

    /// Looks up an indexed entry by id.
    #[must_use]
    pub fn entry(&self, id: &EntryId) -> Option<&KnowledgeEntry> {
        self.entries.get(id)
    }

    /// Iterates over the indexed entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.entries.values()
    }

    /// Number of indexed (active) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotonic build counter assigned by the owner of the index.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if at least one entry carries a usable embedding.
    #[must_use]
    pub fn has_embeddings(&self) -> bool {
        !self.embedding.is_empty()
    }

    pub fn exact(&self) -> &ExactIndex {
        &self.exact
    }

    pub fn embedding(&self) -> &EmbeddingIndex {
        &self.embedding
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Checks that every tier agrees with the indexed entry set.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InconsistentIndexState` describing the first
    /// disagreement found.
    pub fn verify(&self) -> Result<()> {
        if self.lexical.len() != self.entries.len() {
            return Err(KotaeError::InconsistentIndexState(format!(
                "lexical tier holds {} documents for {} entries",
                self.lexical.len(),
                self.entries.len()
            )));
        }
        if let Some(id) = self.lexical.ids().find(|id| !self.entries.contains_key(*id)) {
            return Err(KotaeError::InconsistentIndexState(format!(
                "lexical tier references unknown entry {id}"
            )));
        }
        if let Some(id) = self.exact.ids().find(|id| !self.entries.contains_key(*id)) {
            return Err(KotaeError::InconsistentIndexState(format!(
                "exact tier references unknown entry {id}"
            )));
        }
        if self.embedding.len() > self.entries.len() {
            return Err(KotaeError::InconsistentIndexState(format!(
                "embedding tier holds {} vectors for {} entries",
                self.embedding.len(),
                self.entries.len()
            )));
        }
        if let Some(entry) = self.entries.values().find(|e| !e.active) {
            return Err(KotaeError::InconsistentIndexState(format!(
                "inactive entry {} is indexed",
                entry.id
            )));
        }
        Ok(())
    }
}

/// The most common vector length, preferring the first seen on a tie.
fn majority_dimension<'a>(vectors: impl Iterator<Item = &'a [f32]>) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for vector in vectors {
        match counts.iter_mut().find(|(dim, _)| *dim == vector.len()) {
            Some((_, count)) => *count += 1,
            None => counts.push((vector.len(), 1)),
        }
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (dim, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((dim, count)),
        })
        .map(|(dim, _)| dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, question: &str) -> KnowledgeEntry {
        KnowledgeEntry::with_id(EntryId::from(id), question, "answer").unwrap()
    }

    #[test]
    fn build_skips_inactive() {
        let mut inactive = entry("b", "Inactive question");
        inactive.active = false;
        let index = SearchIndex::build(
            &[entry("a", "Active question"), inactive],
            SimilarityScale::default(),
            1,
        );
        assert_eq!(index.len(), 1);
        assert!(index.entry(&EntryId::from("b")).is_none());
        assert!(index.verify().is_ok());
    }

    #[test]
    fn build_tolerates_mismatched_embeddings() {
        let a = entry("a", "First").with_embedding(vec![1.0, 0.0]);
        let b = entry("b", "Second").with_embedding(vec![1.0, 0.0, 0.0]);
        let index = SearchIndex::build(&[a, b], SimilarityScale::default(), 1);

        assert_eq!(index.len(), 2);
        assert_eq!(index.embedding().len(), 1);
        assert!(index.has_embeddings());
        assert!(index.verify().is_ok());
    }

    #[test]
    fn stray_short_vector_does_not_evict_the_majority() {
        let stray = entry("kb_0", "Stray").with_embedding(vec![1.0]);
        let b = entry("kb_1", "Second").with_embedding(vec![1.0, 0.0, 0.0]);
        let c = entry("kb_2", "Third").with_embedding(vec![0.0, 1.0, 0.0]);
        let index = SearchIndex::build(&[stray, b, c], SimilarityScale::default(), 1);

        assert_eq!(index.len(), 3);
        assert_eq!(index.embedding().len(), 2);
        assert_eq!(index.embedding().dimension(), Some(3));
        assert!(index.verify().is_ok());
    }

    #[test]
    fn majority_dimension_breaks_ties_by_first_seen() {
        let vectors: [&[f32]; 3] = [&[1.0, 2.0], &[1.0], &[3.0]];
        assert_eq!(majority_dimension(vectors.into_iter()), Some(1));
        let tied: [&[f32]; 2] = [&[1.0, 2.0], &[1.0]];
        assert_eq!(majority_dimension(tied.into_iter()), Some(2));
        assert_eq!(majority_dimension(std::iter::empty()), None);
    }

    #[test]
    fn build_skips_invalid_entries() {
        let mut broken = entry("broken", "Question");
        broken.answer.clear();
        let index = SearchIndex::build(&[broken], SimilarityScale::default(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn empty_index_verifies() {
        let index = SearchIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.generation(), 0);
        assert!(index.verify().is_ok());
    }
}
