//! # Embedding Index
//!
//! Holds one dense vector per active entry, as supplied by an external
//! embedding provider, and answers brute-force cosine nearest-neighbour
//! queries. The core never computes embeddings itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KotaeError, Result};
use crate::types::{EntryId, MatchCandidate, Tier};

/// How raw cosine similarity in `[-1, 1]` maps onto a confidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityScale {
    /// Raw cosine; negative similarity becomes zero.
    #[default]
    Clamped,
    /// `(cos + 1) / 2`, keeping the ordering of dissimilar vectors.
    Shifted,
}

impl SimilarityScale {
    /// Converts a raw cosine similarity into a confidence in `[0.0, 1.0]`.
    #[must_use]
    pub fn apply(self, cosine: f32) -> f32 {
        let value = match self {
            Self::Clamped => cosine,
            Self::Shifted => (cosine + 1.0) / 2.0,
        };
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredVector {
    values: Vec<f32>,
    norm: f32,
}

impl StoredVector {
    fn new(values: Vec<f32>) -> Self {
        let norm = l2_norm(&values);
        Self { values, norm }
    }
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Cosine similarity of two equal-length vectors; zero if either is all zeros.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (na, nb) = (l2_norm(a), l2_norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Dense-vector index keyed by entry id.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    vectors: BTreeMap<EntryId, StoredVector>,
    dimension: Option<usize>,
    scale: SimilarityScale,
}

impl EmbeddingIndex {
    /// Creates an empty index using the given similarity scale.
    #[must_use]
    pub fn new(scale: SimilarityScale) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Inserts or replaces the vector for `entry_id`.
    ///
    /// The first vector fixes the index dimension.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the vector is empty, contains
    /// non-finite values, or does not match the index dimension.
    pub fn upsert(&mut self, entry_id: EntryId, embedding: Vec<f32>) -> Result<()> {
        if embedding.is_empty() {
            return Err(KotaeError::InvalidEntry(format!(
                "entry {entry_id} has a zero-length embedding"
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(KotaeError::InvalidEntry(format!(
                "entry {entry_id} has a non-finite embedding component"
            )));
        }

        // A lone vector being replaced may change the dimension.
        let sole_owner = self.vectors.len() == 1 && self.vectors.contains_key(&entry_id);
        match self.dimension {
            Some(dim) if dim != embedding.len() && !sole_owner => {
                return Err(KotaeError::InvalidEntry(format!(
                    "entry {entry_id} embedding has dimension {}, index expects {dim}",
                    embedding.len()
                )));
            }
            _ => self.dimension = Some(embedding.len()),
        }

        self.vectors.insert(entry_id, StoredVector::new(embedding));
        Ok(())
    }

    /// Removes the vector for `entry_id`. Returns `true` if one was present.
    pub fn remove(&mut self, entry_id: &EntryId) -> bool {
        let removed = self.vectors.remove(entry_id).is_some();
        if self.vectors.is_empty() {
            self.dimension = None;
        }
        removed
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if no vectors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension shared by all stored vectors, if any are stored.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Returns `true` if a vector is stored for `entry_id`.
    #[must_use]
    pub fn contains(&self, entry_id: &EntryId) -> bool {
        self.vectors.contains_key(entry_id)
    }

    /// Returns the top `top_k` entries by cosine similarity to `vector`.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::EmbeddingUnavailable` if the index is empty or
    /// the query vector cannot be compared against it (wrong dimension,
    /// zero norm, non-finite values).
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<MatchCandidate>> {
        let Some(dim) = self.dimension else {
            return Err(KotaeError::EmbeddingUnavailable(
                "no entry embeddings indexed".into(),
            ));
        };
        if vector.len() != dim {
            return Err(KotaeError::EmbeddingUnavailable(format!(
                "query embedding has dimension {}, index expects {dim}",
                vector.len()
            )));
        }
        let query_norm = l2_norm(vector);
        if query_norm == 0.0 || !query_norm.is_finite() {
            return Err(KotaeError::EmbeddingUnavailable(
                "query embedding has zero or non-finite norm".into(),
            ));
        }

        let mut candidates: Vec<MatchCandidate> = self
            .vectors
            .iter()
            .map(|(id, stored)| {
                let cosine = if stored.norm == 0.0 {
                    0.0
                } else {
                    dot(vector, &stored.values) / (query_norm * stored.norm)
                };
                MatchCandidate::new(id.clone(), self.scale.apply(cosine), Tier::Embedding)
            })
            .collect();

        if self.scale == SimilarityScale::Clamped && candidates.iter().all(|c| c.confidence == 0.0)
        {
            warn!("embedding query found no positively similar entries");
        }

        candidates.sort_by(MatchCandidate::rank);
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntryId {
        EntryId::from(s)
    }

    fn index_with(vectors: &[(&str, Vec<f32>)]) -> EmbeddingIndex {
        let mut index = EmbeddingIndex::new(SimilarityScale::Clamped);
        for (name, v) in vectors {
            index.upsert(id(name), v.clone()).unwrap();
        }
        index
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_scales() {
        assert_eq!(SimilarityScale::Clamped.apply(-0.5), 0.0);
        assert_eq!(SimilarityScale::Clamped.apply(0.4), 0.4);
        assert_eq!(SimilarityScale::Shifted.apply(-1.0), 0.0);
        assert_eq!(SimilarityScale::Shifted.apply(0.0), 0.5);
        assert_eq!(SimilarityScale::Shifted.apply(1.0), 1.0);
    }

    #[test]
    fn test_query_top_k() {
        let index = index_with(&[
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.9, 0.1, 0.0]),
            ("c", vec![0.0, 1.0, 0.0]),
        ]);
        let results = index.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry_id, id("a"));
        assert_eq!(results[1].entry_id, id("b"));
        assert!(results.iter().all(|c| c.tier == Tier::Embedding));
    }

    #[test]
    fn test_negative_similarity_clamped() {
        let index = index_with(&[("a", vec![-1.0, 0.0])]);
        let results = index.query(&[1.0, 0.0], 5).unwrap();
        assert_eq!(results[0].confidence, 0.0);
    }

    #[test]
    fn test_shifted_scale_orders_dissimilar() {
        let mut index = EmbeddingIndex::new(SimilarityScale::Shifted);
        index.upsert(id("opposite"), vec![-1.0, 0.0]).unwrap();
        index.upsert(id("orthogonal"), vec![0.0, 1.0]).unwrap();
        let results = index.query(&[1.0, 0.0], 5).unwrap();
        assert_eq!(results[0].entry_id, id("orthogonal"));
        assert!((results[0].confidence - 0.5).abs() < 1e-6);
        assert_eq!(results[1].confidence, 0.0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = index_with(&[("a", vec![1.0, 0.0])]);
        assert!(index.upsert(id("b"), vec![1.0, 0.0, 0.0]).is_err());
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 1),
            Err(KotaeError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn test_sole_vector_may_change_dimension() {
        let mut index = index_with(&[("a", vec![1.0, 0.0])]);
        index.upsert(id("a"), vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.dimension(), Some(3));
    }

    #[test]
    fn test_empty_index_unavailable() {
        let index = EmbeddingIndex::default();
        assert!(matches!(
            index.query(&[1.0], 1),
            Err(KotaeError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn test_zero_query_unavailable() {
        let index = index_with(&[("a", vec![1.0, 0.0])]);
        assert!(index.query(&[0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_remove() {
        let mut index = index_with(&[("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])]);
        assert!(index.remove(&id("a")));
        assert!(!index.remove(&id("a")));
        assert!(!index.contains(&id("a")));
        assert_eq!(index.len(), 1);
        assert!(index.remove(&id("b")));
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut index = EmbeddingIndex::default();
        assert!(index.upsert(id("a"), vec![f32::NAN, 1.0]).is_err());
        assert!(index.upsert(id("a"), vec![]).is_err());
    }
}
