use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entry::EntryId;

/// The lookup strategy that produced a candidate.
///
/// Variants are declared in ascending priority, so `Tier::Exact` compares
/// greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// TF-IDF term overlap.
    Lexical,
    /// Dense-vector cosine similarity.
    Embedding,
    /// Verbatim repeat of a stored question (after normalization).
    Exact,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Embedding => write!(f, "embedding"),
            Self::Lexical => write!(f, "lexical"),
        }
    }
}

/// A non-persistent query result pointing at a knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// The matched entry.
    pub entry_id: EntryId,

    /// Confidence score in `[0.0, 1.0]`. Not a probability.
    pub confidence: f32,

    /// Which tier produced this candidate.
    pub tier: Tier,
}

impl MatchCandidate {
    /// Creates a candidate, clamping the confidence into `[0.0, 1.0]`.
    ///
    /// A NaN score is treated as no similarity.
    #[must_use]
    pub fn new(entry_id: EntryId, confidence: f32, tier: Tier) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            entry_id,
            confidence,
            tier,
        }
    }

    /// Ranking order: higher confidence first, then higher tier priority,
    /// then entry id so equal candidates sort deterministically.
    #[must_use]
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| other.tier.cmp(&self.tier))
            .then_with(|| self.entry_id.cmp(&other.entry_id))
    }

    /// Returns `true` if `self` should replace `other` when both refer to the
    /// same entry.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        match self.confidence.total_cmp(&other.confidence) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.tier > other.tier,
        }
    }
}

impl fmt::Display for MatchCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MatchCandidate(id={}, conf={:.2}, tier={})",
            self.entry_id, self.confidence, self.tier
        )
    }
}
