//! OpenAI-compatible embeddings client.
//!
//! Works with any endpoint that serves `POST {api_base}/v1/embeddings`.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request body for an embeddings call.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response from an embeddings call.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Live embedding service client.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    /// Create a client with the configured request timeout.
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }

    /// Map a failed response onto the collaborator error taxonomy.
    fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str, chars: usize) -> EmbedError {
        let detail = serde_json::from_str::<ApiError>(body).ok().map(|e| e.error);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return EmbedError::RateLimited { retry_after };
        }
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return EmbedError::InputTooLarge { chars };
        }
        if let Some(detail) = &detail {
            let too_long = detail.code.as_deref() == Some("context_length_exceeded")
                || detail.message.contains("maximum context length");
            if too_long {
                return EmbedError::InputTooLarge { chars };
            }
        }
        if status.is_server_error() {
            return EmbedError::Transport(format!("server error ({}): {}", status, body));
        }
        match detail {
            Some(detail) => EmbedError::Api(format!("API error ({}): {}", status, detail.message)),
            None => EmbedError::Api(format!("Request failed ({}): {}", status, body)),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(EmbedError::InputTooLarge { chars });
        }

        let request = EmbeddingRequest {
            model: model_id,
            input: text,
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::classify(status, retry_after, &body, chars));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| EmbedError::Api(format!("malformed response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Api("No embeddings in response".to_string()))?;

        debug!(model = model_id, chars, dim = vector.len(), "embedded text");
        Ok(vector)
    }
}
