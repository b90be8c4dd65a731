//! Blocking client for OpenAI-compatible `POST /embeddings` endpoints.
//!
//! Works against the hosted OpenAI API as well as local servers that speak
//! the same wire format (Ollama, LM Studio, vLLM).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Embedding provider backed by an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbeddings {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns `EmbedError::MissingApiKey` for the hosted OpenAI API without
    /// a key, or `EmbedError::Http` if the HTTP client cannot be built.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.api_key.is_none() && config.is_hosted_openai() {
            return Err(EmbedError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let payload = EmbeddingRequest {
            model: &self.config.model,
            input: inputs,
            dimensions: self.config.dimensions,
        };
        debug!(model = %self.config.model, inputs = inputs.len(), "requesting embeddings");

        let mut request = self.client.post(self.config.endpoint()).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), %message, "embedding request rejected");
            return Err(EmbedError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let vectors = parse_response(&body)?;
        if vectors.len() != inputs.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Decodes a response body into vectors ordered by input position.
fn parse_response(body: &str) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)?;
    response.data.sort_by_key(|d| d.index);

    response
        .data
        .into_iter()
        .map(|d| {
            if d.embedding.is_empty() {
                Err(EmbedError::InvalidResponse(format!(
                    "vector {} is empty",
                    d.index
                )))
            } else if d.embedding.iter().any(|v| !v.is_finite()) {
                Err(EmbedError::InvalidResponse(format!(
                    "vector {} has non-finite components",
                    d.index
                )))
            } else {
                Ok(d.embedding)
            }
        })
        .collect()
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        self.request(&[text])?
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("no vectors returned".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let trimmed: Vec<&str> = texts.iter().map(|t| t.trim()).collect();
        if trimmed.iter().any(|t| t.is_empty()) {
            return Err(EmbedError::EmptyInput);
        }
        self.request(&trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> EmbeddingConfig {
        EmbeddingConfig::new()
            .with_base_url("http://127.0.0.1:9/v1")
            .with_model("nomic-embed-text")
            .with_timeout_secs(1)
    }

    #[test]
    fn test_request_shape() {
        let payload = EmbeddingRequest {
            model: "text-embedding-3-large",
            input: &["What is Solana?"],
            dimensions: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-3-large", "input": ["What is Solana?"]})
        );

        let payload = EmbeddingRequest {
            dimensions: Some(256),
            ..payload
        };
        assert_eq!(serde_json::to_value(&payload).unwrap()["dimensions"], 256);
    }

    #[test]
    fn test_parse_orders_by_index() {
        let body = r#"{
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "text-embedding-3-large",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let vectors = parse_response(body).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_empty_vector() {
        let body = r#"{"data": [{"index": 0, "embedding": []}]}"#;
        assert!(matches!(parse_response(body), Err(EmbedError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(matches!(parse_response("<html>"), Err(EmbedError::Decode(_))));
    }

    #[test]
    fn test_hosted_api_requires_key() {
        assert!(matches!(
            OpenAiEmbeddings::new(EmbeddingConfig::new()),
            Err(EmbedError::MissingApiKey)
        ));
        assert!(OpenAiEmbeddings::new(EmbeddingConfig::new().with_api_key("sk-test")).is_ok());
    }

    #[test]
    fn test_empty_input_rejected_before_request() {
        let provider = OpenAiEmbeddings::new(local()).unwrap();
        assert!(matches!(provider.embed("   "), Err(EmbedError::EmptyInput)));
        assert!(matches!(provider.embed_batch(&["ok", ""]), Err(EmbedError::EmptyInput)));
        assert!(provider.embed_batch(&[]).unwrap().is_empty());
        assert_eq!(provider.model(), "nomic-embed-text");
    }

    #[test]
    fn test_unreachable_endpoint_is_http_error() {
        let provider = OpenAiEmbeddings::new(local()).unwrap();
        assert!(matches!(provider.embed("What is Solana?"), Err(EmbedError::Http(_))));
    }
}
