//! # Kotae Core
//!
//! Tiered knowledge-base matching for RFP answering. Given a free-text
//! question, finds the curated answers that best match it: an exact lookup
//! on the normalized question first, then dense-embedding similarity, then
//! TF-IDF lexical similarity, merged into one ranked list.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kotae_core::{KnowledgeEntry, Matcher, MemoryStore, Tier};
//!
//! let store = MemoryStore::with_entries([
//!     KnowledgeEntry::new("What is Solana?", "A high-performance blockchain.").unwrap(),
//!     KnowledgeEntry::new("What is the average TPS?", "~4000 TPS sustained.").unwrap(),
//! ]);
//! let matcher = Matcher::with_store(Arc::new(store));
//!
//! let best = matcher.best_answer("what is SOLANA", 0.1).unwrap().unwrap();
//! assert_eq!(best.tier, Tier::Exact);
//! assert_eq!(best.confidence, 1.0);
//! ```
pub mod error;
pub mod extract;
pub mod guard;
pub mod index;
pub mod knowledge;
pub mod matcher;
pub mod normalize;
pub mod policy;
pub mod store;
pub mod types;

// Re-export primary API
pub use error::{KotaeError, Result};
pub use extract::QuestionExtractor;
pub use index::{EmbeddingIndex, ExactIndex, LexicalIndex, SearchIndex, SimilarityScale};
pub use knowledge::{Answer, AnswerSource, ImportReport, KnowledgeBase, KnowledgeStats};
pub use matcher::{Matcher, MatcherConfig};
pub use normalize::normalize;
pub use store::{EntryStore, MemoryStore};
pub use types::{
    EntryId, EntryRecord, EntryUpdate, KnowledgeEntry, MatchCandidate, NewEntry, Tier,
};
