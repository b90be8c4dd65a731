//! # Kotae
//!
//! Retrieval-first answering of RFP questions from a curated knowledge base.
//!
//! This crate bundles the matching engine from `kotae-core` with the
//! embedding provider clients from `kotae-embed`.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kotae::{embed_or_skip, EmbeddingProvider, KnowledgeBase, MatcherConfig, MemoryStore, NewEntry};
//!
//! let kb = KnowledgeBase::new(Arc::new(MemoryStore::new()), MatcherConfig::default());
//! kb.add_entry(NewEntry::new("What is Solana?", "A high-performance blockchain."), "admin")
//!     .unwrap();
//!
//! let question = "what is solana";
//! let vector = embed_or_skip(None::<&dyn EmbeddingProvider>, question);
//! let answer = kb
//!     .answer(question, vector.as_deref(), kotae::policy::MIN_USEFUL, kotae::policy::FALLBACK)
//!     .unwrap();
//! assert_eq!(answer.text(), Some("A high-performance blockchain."));
//! ```
pub use kotae_core::*;
pub use kotae_embed::{
    embed_or_skip, EmbedError, EmbeddingConfig, EmbeddingProvider, OpenAiEmbeddings,
};
