//! Recommended operating points for callers of the matcher.
//!
//! The matcher applies no hidden floor; these are caller-owned defaults.

/// Answers at or above this confidence can be surfaced without review.
pub const HIGH_CONFIDENCE: f32 = 0.7;

/// Lowest confidence worth surfacing as a knowledge-base answer.
pub const MIN_USEFUL: f32 = 0.1;

/// Stricter variant of [`MIN_USEFUL`] for bulk-extracted documents.
pub const MIN_USEFUL_STRICT: f32 = 0.2;

/// Broader retry threshold used when nothing clears [`MIN_USEFUL`].
pub const FALLBACK: f32 = 0.05;

/// Threshold above which a new question duplicates an existing entry.
pub const DUPLICATE: f32 = crate::matcher::MIN_DUPLICATE_THRESHOLD;

/// Default number of results for interactive search.
pub const DEFAULT_LIMIT: usize = 10;
