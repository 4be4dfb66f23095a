//! The completion-service seam: one structured model call, plus retry.
//!
//! [`CompletionService`] is the only place the pipeline talks to a language
//! model. The production implementation, [`ProviderCompletion`], wraps any
//! `edgequake_llm` provider; tests plug in scripted stubs.
//!
//! ## Retry Strategy
//!
//! Only rate-limit / quota signals ([`CompletionError::Transient`]) are
//! retried, with exponential backoff plus uniform jitter:
//! `min(initial * 2^n, max) + rand(0..=jitter)`. With the defaults (2 s,
//! 60 s cap, 3 s jitter, 6 retries) a batch waits at most a few minutes
//! before the whole run gives up. Every other failure propagates on the
//! first attempt.

use crate::config::ChunkingConfig;
use crate::error::{CompletionError, Pdf2ChunksError};
use crate::prompts::CHUNKING_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A stateless structured-output model call.
///
/// Implementations must be safe to call repeatedly in sequence; the driver
/// reuses one instance for every batch of a document.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `prompt`, asking for a JSON value shaped like `schema`.
    async fn complete(&self, prompt: &str, schema: &Value) -> Result<Value, CompletionError>;

    /// Model identifier recorded in the output artifact.
    fn model(&self) -> String {
        "unknown".to_string()
    }

    /// Provider name recorded in the output artifact, when known.
    fn provider(&self) -> Option<String> {
        None
    }
}

/// [`CompletionService`] backed by an `edgequake_llm` provider.
pub struct ProviderCompletion {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderCompletion {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ChunkingConfig) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl CompletionService for ProviderCompletion {
    async fn complete(&self, prompt: &str, schema: &Value) -> Result<Value, CompletionError> {
        let messages = vec![
            ChatMessage::system(format!("{CHUNKING_SYSTEM_PROMPT}\n{schema}")),
            ChatMessage::user(prompt),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| CompletionError::from_provider_message(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        parse_structured(&response.content)
    }

    fn model(&self) -> String {
        self.provider.model().to_string()
    }

    fn provider(&self) -> Option<String> {
        Some(self.provider.name().to_string())
    }
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z0-9_-]*\n?(.*?)\n?```$").unwrap());

/// Strip one outer Markdown code fence, which models add despite instructions.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match RE_CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse raw model text as JSON, tolerating a surrounding code fence.
pub fn parse_structured(raw: &str) -> Result<Value, CompletionError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|_| CompletionError::Unstructured {
        raw: body.to_string(),
    })
}

/// Delay and backoff settings for one batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Slept before every attempt, to stay under external rate limits.
    pub request_delay: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            request_delay: Duration::try_from_secs_f64(config.request_delay_secs)
                .unwrap_or(Duration::ZERO),
            initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// No delays at all; handy for tests and local stubs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            request_delay: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Deterministic part of the wait before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }

    fn jittered_backoff(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.backoff(retry) + Duration::from_millis(extra)
    }
}

/// Call `service` with the retry policy, mapping failures to fatal errors
/// tagged with `batch` (1-indexed).
///
/// Makes at most `policy.max_retries + 1` attempts.
pub async fn complete_with_retry(
    service: &dyn CompletionService,
    prompt: &str,
    schema: &Value,
    policy: &RetryPolicy,
    batch: usize,
) -> Result<Value, Pdf2ChunksError> {
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if !policy.request_delay.is_zero() {
            sleep(policy.request_delay).await;
        }

        match service.complete(prompt, schema).await {
            Ok(value) => return Ok(value),
            Err(CompletionError::Transient { message }) => {
                if attempt >= max_attempts {
                    return Err(Pdf2ChunksError::RetriesExhausted {
                        batch,
                        attempts: attempt,
                        last_error: message,
                    });
                }
                let wait = policy.jittered_backoff(attempt - 1);
                warn!(
                    "Batch {}: retry {}/{} after {}ms — {}",
                    batch,
                    attempt,
                    policy.max_retries,
                    wait.as_millis(),
                    message
                );
                sleep(wait).await;
            }
            Err(CompletionError::Api { message }) => {
                return Err(Pdf2ChunksError::LlmApiError { batch, message });
            }
            Err(CompletionError::Unstructured { raw }) => {
                return Err(Pdf2ChunksError::StructuredOutput { batch, raw });
            }
        }
    }
}
