//! Pipeline stages for PDF-to-chunks conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ ocr ──▶ batch ──▶ segment ──▶ assemble
//! (URL/path) (pdfium)  (VLM)   (windows)  (LLM + clamp) (ids, chapters)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path, URL, or bytes to a
//!    local file
//! 2. [`extract`]  — per-page native text; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`ocr`]      — transcribe thin pages with a vision model
//! 4. [`batch`]    — page cap and fixed-size page windows
//! 5. [`segment`]  — one stateless LLM call per window, then normalisation
//!    and page clamping; the call itself goes through [`completion`]
//! 6. [`assemble`] — chapter-title state machine, ids, chapter ranges
//!
//! The sequential fold over batches lives in [`crate::convert`].

pub mod assemble;
pub mod batch;
pub mod completion;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod segment;
