//! Error types for the pdf2chunks library.
//!
//! Two error types reflect two scopes of failure:
//!
//! * [`Pdf2ChunksError`] — **Fatal**: the document run cannot complete
//!   (bad input file, provider not configured, a batch failed after its
//!   retry budget). Returned as `Err(Pdf2ChunksError)` from the top-level
//!   `convert*` and [`crate::convert::chunk_pages`] functions. No partial
//!   document is ever produced alongside it.
//!
//! * [`CompletionError`] — the outcome of a single completion-service call.
//!   Only [`CompletionError::Transient`] is retried; the retry loop in
//!   [`crate::pipeline::completion`] turns the rest into a fatal error
//!   tagged with the batch index.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2chunks library.
#[derive(Debug, Error)]
pub enum Pdf2ChunksError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Extraction produced no pages, or only pages without text.
    #[error("No text could be extracted from {input} ({pages} pages)")]
    EmptyDocument { input: String, pages: usize },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Text extraction failed for a specific page.
    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned a non-retryable error.
    #[error("LLM API error on batch {batch}: {message}")]
    LlmApiError { batch: usize, message: String },

    /// Rate-limit / quota errors persisted through every retry.
    #[error("Batch {batch} still rate-limited after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        batch: usize,
        attempts: u32,
        last_error: String,
    },

    /// The model answered, but not with the expected JSON shape.
    #[error("Model output for batch {batch} does not match the chunk schema. Output: {raw}")]
    StructuredOutput { batch: usize, raw: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ChunksError {
    /// True for errors detected before any batch reached the model.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Pdf2ChunksError::InvalidConfig(_)
                | Pdf2ChunksError::ProviderNotConfigured { .. }
                | Pdf2ChunksError::PdfiumBindingFailed(_)
        )
    }
}

/// Failure of one completion-service call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Rate-limit or quota exhaustion; worth retrying after a back-off.
    #[error("transient completion failure: {message}")]
    Transient { message: String },

    /// Any other provider failure (auth, bad request, server error).
    #[error("completion failed: {message}")]
    Api { message: String },

    /// The service answered with text that could not be parsed as JSON.
    #[error("completion output is not structured JSON: {raw}")]
    Unstructured { raw: String },
}

impl CompletionError {
    /// Classify a provider error message.
    ///
    /// Only rate-limit and quota signals are transient.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let upper = message.to_uppercase();
        let transient = upper.contains("429")
            || upper.contains("RESOURCE_EXHAUSTED")
            || upper.contains("RATE LIMIT")
            || upper.contains("RATE_LIMIT")
            || upper.contains("QUOTA");
        if transient {
            CompletionError::Transient { message }
        } else {
            CompletionError::Api { message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_are_transient() {
        for msg in [
            "HTTP 429 Too Many Requests",
            "status: RESOURCE_EXHAUSTED",
            "Rate limit exceeded for provider 'gemini'",
            "You exceeded your current quota",
        ] {
            assert!(
                CompletionError::from_provider_message(msg).is_transient(),
                "expected transient: {msg}"
            );
        }
    }

    #[test]
    fn other_messages_are_not_transient() {
        let e = CompletionError::from_provider_message("401 Unauthorized: invalid key");
        assert_eq!(
            e,
            CompletionError::Api {
                message: "401 Unauthorized: invalid key".into()
            }
        );
    }

    #[test]
    fn structured_output_display_carries_raw_text() {
        let e = Pdf2ChunksError::StructuredOutput {
            batch: 2,
            raw: "not json at all".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("batch 2"), "got: {msg}");
        assert!(msg.contains("not json at all"), "got: {msg}");
    }

    #[test]
    fn retries_exhausted_display() {
        let e = Pdf2ChunksError::RetriesExhausted {
            batch: 1,
            attempts: 7,
            last_error: "429".into(),
        };
        assert!(e.to_string().contains("7 attempts"));
    }

    #[test]
    fn config_errors_are_flagged() {
        assert!(Pdf2ChunksError::InvalidConfig("x".into()).is_config_error());
        assert!(!Pdf2ChunksError::Internal("x".into()).is_config_error());
    }
}
