use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Nothing to embed.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// The provider requires an API key and none was configured.
    #[error("embedding provider requires an API key")]
    MissingApiKey,

    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("embedding provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected shape.
    #[error("failed to decode embedding response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response decoded but carried no usable vector.
    #[error("embedding response is unusable: {0}")]
    InvalidResponse(String),
}

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;
