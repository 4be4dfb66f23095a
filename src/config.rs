//! Configuration types for PDF-to-chunks conversion.
//!
//! All conversion behaviour is controlled through [`ChunkingConfig`], built
//! via its [`ChunkingConfigBuilder`]. Keeping every knob in one struct makes
//! it easy to share a config between documents, echo it into the output
//! artifact, and diff two runs to understand why their outputs differ.

use crate::error::Pdf2ChunksError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a PDF-to-chunks conversion.
///
/// Built via [`ChunkingConfig::builder()`] or using
/// [`ChunkingConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2chunks::ChunkingConfig;
///
/// let config = ChunkingConfig::builder()
///     .book_id("book_042")
///     .pages_per_batch(4)
///     .max_pages(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_batch, 4);
/// ```
#[derive(Clone)]
pub struct ChunkingConfig {
    /// Stable identifier stamped on every chunk. Default: "book_demo_001".
    pub book_id: String,

    /// Pages sent to the model per request. Default: 3.
    ///
    /// Small windows keep each prompt well inside the model's context and
    /// give the chapter/carryover state frequent chances to resync.
    pub pages_per_batch: usize,

    /// Only process the first N pages. `None` or `Some(0)` means no limit.
    pub max_pages: Option<usize>,

    /// Target upper bound on words per content chunk. Default: 260.
    pub max_chunk_words: usize,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (verbatim reproduction).
    pub temperature: f32,

    /// Maximum output tokens per batch response. Default: 8192.
    pub max_tokens: usize,

    /// Fixed delay before every completion attempt, in seconds. Default: 0.0.
    pub request_delay_secs: f64,

    /// Retries on rate-limit / quota errors. Default: 6 (7 attempts total).
    pub max_retries: u32,

    /// First back-off wait in milliseconds; doubles per retry. Default: 2000.
    pub retry_initial_backoff_ms: u64,

    /// Cap on a single back-off wait in milliseconds. Default: 60000.
    pub retry_max_backoff_ms: u64,

    /// Upper bound of the uniform random jitter added to each wait. Default: 3000.
    pub retry_jitter_ms: u64,

    /// Fall back to vision-model OCR for pages with little native text. Default: true.
    pub ocr: bool,

    /// Pages with fewer native words than this are OCR candidates. Default: 25.
    pub min_words_before_ocr: usize,

    /// Concurrent OCR calls. Default: 4.
    pub ocr_concurrency: usize,

    /// Longest edge in pixels when rasterising a page for OCR. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-batch progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            book_id: "book_demo_001".to_string(),
            pages_per_batch: 3,
            max_pages: None,
            max_chunk_words: 260,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            request_delay_secs: 0.0,
            max_retries: 6,
            retry_initial_backoff_ms: 2000,
            retry_max_backoff_ms: 60_000,
            retry_jitter_ms: 3000,
            ocr: true,
            min_words_before_ocr: 25,
            ocr_concurrency: 4,
            max_rendered_pixels: 2000,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ChunkingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkingConfig")
            .field("book_id", &self.book_id)
            .field("pages_per_batch", &self.pages_per_batch)
            .field("max_pages", &self.max_pages)
            .field("max_chunk_words", &self.max_chunk_words)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("request_delay_secs", &self.request_delay_secs)
            .field("max_retries", &self.max_retries)
            .field("ocr", &self.ocr)
            .field("min_words_before_ocr", &self.min_words_before_ocr)
            .finish()
    }
}

impl ChunkingConfig {
    /// Create a new builder for `ChunkingConfig`.
    pub fn builder() -> ChunkingConfigBuilder {
        ChunkingConfigBuilder {
            config: Self::default(),
        }
    }

    /// The page cap in effect, if any. Zero means "no limit".
    pub fn page_limit(&self) -> Option<usize> {
        self.max_pages.filter(|&n| n > 0)
    }

    /// Validate the invariants `build()` enforces.
    ///
    /// Public so callers who construct the struct literally can still fail
    /// fast before any batch is sent.
    pub fn validate(&self) -> Result<(), Pdf2ChunksError> {
        if self.book_id.trim().is_empty() {
            return Err(Pdf2ChunksError::InvalidConfig(
                "book_id must not be empty".into(),
            ));
        }
        if self.pages_per_batch == 0 {
            return Err(Pdf2ChunksError::InvalidConfig(
                "pages_per_batch must be ≥ 1".into(),
            ));
        }
        if self.max_chunk_words == 0 {
            return Err(Pdf2ChunksError::InvalidConfig(
                "max_chunk_words must be ≥ 1".into(),
            ));
        }
        if !self.request_delay_secs.is_finite() || self.request_delay_secs < 0.0 {
            return Err(Pdf2ChunksError::InvalidConfig(format!(
                "request_delay_secs must be a non-negative number, got {}",
                self.request_delay_secs
            )));
        }
        Ok(())
    }
}

/// Builder for [`ChunkingConfig`].
pub struct ChunkingConfigBuilder {
    config: ChunkingConfig,
}

impl fmt::Debug for ChunkingConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChunkingConfigBuilder")
            .field(&self.config)
            .finish()
    }
}

impl ChunkingConfigBuilder {
    pub fn book_id(mut self, id: impl Into<String>) -> Self {
        self.config.book_id = id.into();
        self
    }

    pub fn pages_per_batch(mut self, n: usize) -> Self {
        self.config.pages_per_batch = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn max_chunk_words(mut self, n: usize) -> Self {
        self.config.max_chunk_words = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn request_delay_secs(mut self, secs: f64) -> Self {
        self.config.request_delay_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Set initial back-off, cap and jitter (all milliseconds) in one go.
    pub fn retry_backoff_ms(mut self, initial: u64, max: u64, jitter: u64) -> Self {
        self.config.retry_initial_backoff_ms = initial;
        self.config.retry_max_backoff_ms = max.max(initial);
        self.config.retry_jitter_ms = jitter;
        self
    }

    pub fn ocr(mut self, enabled: bool) -> Self {
        self.config.ocr = enabled;
        self
    }

    pub fn min_words_before_ocr(mut self, n: usize) -> Self {
        self.config.min_words_before_ocr = n;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ChunkingConfig, Pdf2ChunksError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ChunkingConfig::default();
        assert_eq!(c.pages_per_batch, 3);
        assert_eq!(c.max_chunk_words, 260);
        assert_eq!(c.max_retries, 6);
        assert_eq!(c.request_delay_secs, 0.0);
        assert_eq!(c.min_words_before_ocr, 25);
        assert!(c.page_limit().is_none());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ChunkingConfig::builder().pages_per_batch(0).build().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("pages_per_batch"));
    }

    #[test]
    fn negative_delay_is_rejected() {
        assert!(ChunkingConfig::builder()
            .request_delay_secs(-1.0)
            .build()
            .is_err());
    }

    #[test]
    fn empty_book_id_is_rejected() {
        assert!(ChunkingConfig::builder().book_id("  ").build().is_err());
    }

    #[test]
    fn zero_max_pages_means_unlimited() {
        let c = ChunkingConfig::builder().max_pages(0).build().unwrap();
        assert_eq!(c.page_limit(), None);
        let c = ChunkingConfig::builder().max_pages(5).build().unwrap();
        assert_eq!(c.page_limit(), Some(5));
    }

    #[test]
    fn backoff_cap_never_below_initial() {
        let c = ChunkingConfig::builder()
            .retry_backoff_ms(500, 100, 0)
            .build()
            .unwrap();
        assert_eq!(c.retry_max_backoff_ms, 500);
    }
}
