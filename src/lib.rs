//! # pdf2chunks
//!
//! Turn a PDF book into an ordered list of chapter-tagged, speakable text
//! chunks, ready for a text-to-speech engine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, URL, or bytes
//!  ├─ 2. Extract   per-page text via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR       thin pages transcribed by a vision model
//!  ├─ 4. Batch     fixed-size page windows
//!  ├─ 5. Segment   one LLM call per window, carrying chapter + carryover
//!  ├─ 6. Assemble  chapter state machine, chunk/chapter ids
//!  └─ 7. Output    JSON document artifact
//! ```
//!
//! Batches are processed strictly in order: each one consumes the chapter
//! title and the unfinished trailing text the previous batch returned.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2chunks::{convert, ChunkingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ChunkingConfig::builder().book_id("moby_dick").build()?;
//!     let document = convert("moby-dick.pdf", &config).await?;
//!     for chunk in &document.chunks {
//!         println!("[{}] {}", chunk.chapter_title, chunk.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2chunks` binary (clap + anyhow + tracing-subscriber) |
//!
//! Any [`CompletionService`] can stand in for the LLM; [`chunk_pages`] runs
//! the whole core on pre-extracted pages without touching pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ChunkingConfig, ChunkingConfigBuilder};
pub use convert::{
    chunk_pages, convert, convert_from_bytes, convert_sync, convert_to_file, write_document,
};
pub use error::{CompletionError, Pdf2ChunksError};
pub use output::{
    BatchDiagnostics, Chapter, Chunk, ChunkKind, DocumentResult, DocumentStats, Limits,
    LlmSettings, PageText, SourceInfo,
};
pub use pipeline::completion::{CompletionService, ProviderCompletion, RetryPolicy};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
