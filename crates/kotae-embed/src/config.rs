/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-large";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Configuration for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Base URL; requests go to `{base_url}/embeddings`.
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present. Local servers usually need none.
    pub api_key: Option<String>,
    /// Request timeout in seconds, within `1..=300`.
    pub timeout_secs: u64,
    /// Requested output dimension, for models that support shortening.
    pub dimensions: Option<u32>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            dimensions: None,
        }
    }
}

impl EmbeddingConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API key. A blank key is treated as none.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    /// Set the request timeout (clamped to `1..=300` seconds).
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.clamp(1, MAX_TIMEOUT_SECS);
        self
    }

    /// Request shortened output vectors (at least 1).
    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions.max(1));
        self
    }

    /// Whether the endpoint is the hosted OpenAI API, which always needs a key.
    pub fn is_hosted_openai(&self) -> bool {
        self.base_url.starts_with(DEFAULT_BASE_URL)
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmbeddingConfig::new();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.endpoint(), "https://api.openai.com/v1/embeddings");
        assert!(config.api_key.is_none());
        assert!(config.is_hosted_openai());
    }

    #[test]
    fn test_builder_clamps() {
        let config = EmbeddingConfig::new()
            .with_base_url("http://localhost:11434/v1/")
            .with_timeout_secs(0)
            .with_dimensions(0)
            .with_api_key("  ");
        assert_eq!(config.endpoint(), "http://localhost:11434/v1/embeddings");
        assert_eq!(config.timeout_secs, 1);
        assert_eq!(config.dimensions, Some(1));
        assert!(config.api_key.is_none());
        assert!(!config.is_hosted_openai());

        assert_eq!(EmbeddingConfig::new().with_timeout_secs(10_000).timeout_secs, 300);
    }
}
