//! # Kotae Embed
//!
//! Embedding providers for the Kotae embedding tier. The matcher never
//! calls a provider itself: callers embed the question up front and pass
//! the vector in, so a provider outage degrades retrieval to the exact and
//! lexical tiers instead of failing it.
//!
//! ```rust
//! use kotae_embed::{embed_or_skip, EmbeddingProvider};
//!
//! // No provider configured: the question is answered without a vector.
//! assert_eq!(embed_or_skip(None::<&dyn EmbeddingProvider>, "What is Solana?"), None);
//! ```
pub mod config;
pub mod error;
pub mod openai;

use tracing::warn;

pub use config::{EmbeddingConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{EmbedError, Result};
pub use openai::OpenAiEmbeddings;

/// A source of dense text embeddings.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logging and provenance.
    fn model(&self) -> &str;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns `EmbedError::EmptyInput` for blank text, or a provider error.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds several texts, preserving order.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any text fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for &P {
    fn model(&self) -> &str {
        (**self).model()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Embeds `text` if a provider is available, logging and swallowing
/// failures so the caller can fall back to the exact and lexical tiers.
pub fn embed_or_skip<P>(provider: Option<P>, text: &str) -> Option<Vec<f32>>
where
    P: EmbeddingProvider,
{
    let provider = provider?;
    match provider.embed(text) {
        Ok(vector) => Some(vector),
        Err(err) => {
            warn!(model = provider.model(), error = %err, "embedding unavailable; continuing without it");
            None
        }
    }
}
