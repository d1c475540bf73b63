//! Single-field generation with rate-limit retries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::enrichment::filter::filter_response;
use crate::error::GenerateError;
use crate::traits::generator::{GenerateRequest, TextGenerator};
use crate::types::config::EnrichmentConfig;
use crate::types::prompts::FieldPrompt;

/// Why a field was not produced.
///
/// This is an expected terminal outcome, not an error: the field simply
/// stays unset and sibling work continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FieldFailure {
    /// Still rate limited after every retry
    RateLimitExhausted { attempts: u32 },
    /// The service refused the request for another reason
    Rejected { message: String },
    /// The response was blank after filtering
    EmptyResponse,
    /// The worker handling this segment stopped before reporting
    WorkerLost,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFailure::RateLimitExhausted { attempts } => {
                write!(f, "rate limited after {attempts} attempts")
            }
            FieldFailure::Rejected { message } => write!(f, "rejected: {message}"),
            FieldFailure::EmptyResponse => f.write_str("empty response"),
            FieldFailure::WorkerLost => f.write_str("worker lost"),
        }
    }
}

/// Result of generating one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Generated(String),
    Failed(FieldFailure),
}

impl FieldOutcome {
    pub fn is_generated(&self) -> bool {
        matches!(self, FieldOutcome::Generated(_))
    }
}

/// Produces one field value for one segment.
///
/// Rate-limit responses are retried up to `max_retries` times with
/// exponential backoff; any other failure ends the field immediately.
pub struct EnrichmentClient<G: ?Sized> {
    generator: Arc<G>,
    config: EnrichmentConfig,
}

impl<G: ?Sized> Clone for EnrichmentClient<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
        }
    }
}

impl<G: TextGenerator + ?Sized> EnrichmentClient<G> {
    /// Create a client around a generator.
    pub fn new(generator: Arc<G>, config: EnrichmentConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Wait before retry `attempt` (0-based): `initial_wait * 2^attempt`,
    /// stretched to any server-supplied `retry_after`.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let wait = self.config.initial_wait.saturating_mul(factor);
        retry_after.map_or(wait, |hint| wait.max(hint))
    }

    /// Generate one field for a segment.
    pub async fn generate_field(&self, text: &str, prompt: &FieldPrompt) -> FieldOutcome {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.render(text),
            max_tokens: prompt.max_tokens,
            temperature: self.config.temperature,
        };

        let mut attempt = 0u32;
        loop {
            match self.generator.generate(&request).await {
                Ok(raw) => {
                    return match filter_response(prompt.field, &raw) {
                        Some(value) => {
                            debug!(field = %prompt.field, attempt, "field generated");
                            FieldOutcome::Generated(value)
                        }
                        None => {
                            warn!(field = %prompt.field, "generator returned empty response");
                            FieldOutcome::Failed(FieldFailure::EmptyResponse)
                        }
                    };
                }
                Err(GenerateError::RateLimited { retry_after }) => {
                    if attempt >= self.config.max_retries {
                        warn!(
                            field = %prompt.field,
                            attempts = attempt + 1,
                            "rate limit retries exhausted"
                        );
                        return FieldOutcome::Failed(FieldFailure::RateLimitExhausted {
                            attempts: attempt + 1,
                        });
                    }

                    let wait = self.backoff(attempt, retry_after);
                    warn!(
                        field = %prompt.field,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(GenerateError::Other(message)) => {
                    warn!(field = %prompt.field, error = %message, "field generation failed");
                    return FieldOutcome::Failed(FieldFailure::Rejected { message });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;
    use crate::types::prompts::PromptSet;
    use crate::types::segment::FieldName;

    fn client(generator: MockGenerator, retries: u32) -> EnrichmentClient<MockGenerator> {
        EnrichmentClient::new(
            Arc::new(generator),
            EnrichmentConfig::new().with_retries(retries, Duration::from_secs(5)),
        )
    }

    fn summary_prompt() -> FieldPrompt {
        PromptSet::video().get(FieldName::Field1).cloned().unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_respects_hint() {
        let client = client(MockGenerator::new(), 3);

        assert_eq!(client.backoff(0, None), Duration::from_secs(5));
        assert_eq!(client.backoff(2, None), Duration::from_secs(20));
        assert_eq!(
            client.backoff(0, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limit_then_succeeds() {
        let generator = MockGenerator::new()
            .with_default_response("A summary.")
            .rate_limit_first(2);
        let client = client(generator.clone(), 3);

        let start = tokio::time::Instant::now();
        let outcome = client.generate_field("segment text", &summary_prompt()).await;

        assert_eq!(outcome, FieldOutcome::Generated("A summary.".into()));
        assert_eq!(generator.call_count(), 3);
        // 5s + 10s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_sentinel() {
        let generator = MockGenerator::new().rate_limit_first(10);
        let client = client(generator.clone(), 3);

        let outcome = client.generate_field("segment text", &summary_prompt()).await;

        assert_eq!(
            outcome,
            FieldOutcome::Failed(FieldFailure::RateLimitExhausted { attempts: 4 })
        );
        assert_eq!(generator.call_count(), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let generator = MockGenerator::new().fail_when_prompt_contains("segment", "bad request");
        let client = client(generator.clone(), 3);

        let outcome = client.generate_field("segment text", &summary_prompt()).await;

        assert_eq!(
            outcome,
            FieldOutcome::Failed(FieldFailure::Rejected {
                message: "bad request".into()
            })
        );
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_carries_prompt_settings() {
        let generator = MockGenerator::new().with_default_response("  Title  ");
        let client = client(generator.clone(), 0);
        let prompt = PromptSet::video().get(FieldName::Title).cloned().unwrap();

        let outcome = client.generate_field("the words", &prompt).await;
        assert_eq!(outcome, FieldOutcome::Generated("Title".into()));

        let calls = generator.calls();
        assert_eq!(calls[0].max_tokens, 50);
        assert_eq!(calls[0].model, "gpt-4.1-nano");
        assert!(calls[0].prompt.contains("the words"));
    }
}
