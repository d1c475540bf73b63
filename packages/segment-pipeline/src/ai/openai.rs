//! OpenAI implementation of the TextGenerator trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use segment_pipeline::ai::OpenAIGenerator;
//!
//! let generator = Arc::new(OpenAIGenerator::from_env()?);
//! let pipeline = Pipeline::new(store, generator, config)?;
//! ```

use async_trait::async_trait;
use openai_client::{ChatRequest, OpenAIClient, OpenAIError};

use crate::error::{ConfigError, GenerateError};
use crate::traits::generator::{GenerateRequest, TextGenerator};

/// Chat-completions backed generator.
///
/// HTTP 429 maps to [`GenerateError::RateLimited`]; everything else,
/// including network failures, is non-retryable.
#[derive(Clone)]
pub struct OpenAIGenerator {
    client: OpenAIClient,
}

impl OpenAIGenerator {
    /// Create a generator with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: OpenAIClient::new(api_key),
        }
    }

    /// Create from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let client = OpenAIClient::from_env()
            .map_err(|_| ConfigError::MissingEnv("OPENAI_API_KEY".into()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: OpenAIClient) -> Self {
        Self { client }
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let chat = ChatRequest::prompt(&request.model, &request.prompt)
            .temperature(request.temperature)
            .output_limit(request.max_tokens);

        self.client
            .chat_completion(chat)
            .await
            .map(|response| response.content)
            .map_err(to_generate_error)
    }
}

fn to_generate_error(error: OpenAIError) -> GenerateError {
    match error {
        OpenAIError::RateLimited { retry_after } => GenerateError::RateLimited { retry_after },
        other => GenerateError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_maps_to_retryable() {
        let err = to_generate_error(OpenAIError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        });
        assert_eq!(
            err,
            GenerateError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );

        let err = to_generate_error(OpenAIError::Api {
            status: 400,
            message: "bad".into(),
        });
        assert!(matches!(err, GenerateError::Other(_)));
    }
}
