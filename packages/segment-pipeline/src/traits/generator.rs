//! Generative-text collaborator.
//!
//! The only interface the enrichment client depends on. Any provider that
//! can turn a prompt into text and report throttling satisfies it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Provider model identifier
    pub model: String,

    /// Fully rendered prompt
    pub prompt: String,

    /// Output token cap
    pub max_tokens: u32,

    pub temperature: f32,
}

/// Text generation backend.
///
/// Implementations must return [`GenerateError::RateLimited`] for throttling
/// so the caller can back off; everything else is [`GenerateError::Other`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        (**self).generate(request).await
    }
}
