//! Conversion entry points and the sequential batch driver.
//!
//! A run is a fold over page batches: each batch gets the chapter and
//! carryover state the previous one returned, so batch `n + 1` is never sent
//! before batch `n` is fully normalised. Any batch failure aborts the whole
//! run and nothing is written.

use crate::config::ChunkingConfig;
use crate::error::Pdf2ChunksError;
use crate::output::{
    BatchDiagnostics, DocumentResult, DocumentStats, Limits, LlmSettings, PageText, RawChunk,
    SourceInfo,
};
use crate::pipeline::assemble::assemble;
use crate::pipeline::batch::{limit_pages, page_batches};
use crate::pipeline::completion::{CompletionService, ProviderCompletion, RetryPolicy};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::segment::{
    process_batch, truncate_chars, BatchSettings, CarryState, MAX_TITLE_CHARS,
};
use crate::pipeline::{extract, ocr};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Title used when neither the model nor page 1 offers one.
pub const UNTITLED_BOOK: &str = "Untitled Book";

/// Convert a PDF file or URL into a chunk/chapter document.
///
/// # Errors
/// Any input, configuration, extraction, or batch failure. There is no
/// partial result: either every batch succeeded or the call fails.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ChunkingConfig,
) -> Result<DocumentResult, Pdf2ChunksError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    config.validate()?;

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    run(resolved, config).await
}

/// Convert PDF bytes held in memory.
///
/// The bytes are spilled to a managed temp file because pdfium reads from
/// disk; the file is removed when the call returns.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ChunkingConfig,
) -> Result<DocumentResult, Pdf2ChunksError> {
    config.validate()?;
    let resolved = input::resolve_bytes(bytes)?;
    run(resolved, config).await
}

/// Convert and write the JSON artifact to `output_path`.
///
/// The file only appears once the whole run has succeeded.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ChunkingConfig,
) -> Result<DocumentStats, Pdf2ChunksError> {
    let document = convert(input_str, config).await?;
    write_document(&document, output_path.as_ref()).await?;
    Ok(document.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ChunkingConfig,
) -> Result<DocumentResult, Pdf2ChunksError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2ChunksError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Write `document` as pretty JSON, atomically (temp file + rename).
pub async fn write_document(
    document: &DocumentResult,
    path: &Path,
) -> Result<(), Pdf2ChunksError> {
    let write_failed = |source: std::io::Error| Pdf2ChunksError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = document
        .to_json_pretty()
        .map_err(|e| Pdf2ChunksError::Internal(format!("serialise output: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    info!("Wrote {}", path.display());
    Ok(())
}

async fn run(
    resolved: ResolvedInput,
    config: &ChunkingConfig,
) -> Result<DocumentResult, Pdf2ChunksError> {
    let total_start = Instant::now();

    // Resolve the provider first: a missing key should fail before any PDF work.
    let provider = resolve_provider(config)?;

    let extract_start = Instant::now();
    let extracted = extract::extract_pages(resolved.path(), config).await?;
    let mut pages = extracted.pages;
    if config.ocr {
        let replaced =
            ocr::apply_ocr(&provider, &mut pages, extracted.ocr_candidates, config).await;
        debug!("OCR replaced {} page(s)", replaced);
    }
    info!(
        "Extracted {}/{} pages in {}ms",
        pages.len(),
        extracted.document_pages,
        extract_start.elapsed().as_millis()
    );

    let service = ProviderCompletion::new(provider, config);
    let document = chunk_pages(&service, pages, resolved.source(), config).await?;

    info!(
        "Conversion complete: {} chapters, {} chunks, {}ms total",
        document.stats.chapters_total,
        document.stats.chunks_total,
        total_start.elapsed().as_millis()
    );
    Ok(document)
}

/// Everything the driver accumulates across batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOutput {
    /// First non-empty title guess, or empty.
    pub title_guess: String,
    /// Normalised chunk records of every batch, in batch order.
    pub chunks: Vec<RawChunk>,
    pub diagnostics: Vec<BatchDiagnostics>,
}

/// Fold the batch processor over `batches` in order.
pub async fn drive_batches(
    service: &dyn CompletionService,
    batches: &[&[PageText]],
    config: &ChunkingConfig,
) -> Result<DriverOutput, Pdf2ChunksError> {
    let settings = BatchSettings {
        max_chunk_words: config.max_chunk_words,
        retry: RetryPolicy::from_config(config),
    };
    let progress = config.progress_callback.as_ref();
    let total = batches.len();

    let mut state = CarryState::default();
    let mut out = DriverOutput::default();

    for (i, batch) in batches.iter().enumerate() {
        let batch_index = i + 1;
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            continue;
        };
        if let Some(cb) = progress {
            cb.on_batch_start(batch_index, total);
        }
        info!(
            "Batch {}/{}: pages {}-{}",
            batch_index, total, first.page_number, last.page_number
        );

        let outcome = match process_batch(service, batch, &state, &settings, batch_index).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(cb) = progress {
                    cb.on_batch_error(batch_index, total, &e.to_string());
                }
                return Err(e);
            }
        };

        if out.title_guess.is_empty() && !outcome.book_title_guess.is_empty() {
            out.title_guess = outcome.book_title_guess;
        }

        let chapter_in = state.current_chapter.clone();
        let carryover_in_len = state.carryover_text.chars().count();
        if !outcome.current_chapter_out.is_empty() {
            state.current_chapter = outcome.current_chapter_out;
        }
        state.carryover_text = outcome.carryover_text;

        out.diagnostics.push(BatchDiagnostics {
            batch_index,
            page_start: first.page_number,
            page_end: last.page_number,
            current_chapter_in: chapter_in,
            current_chapter_out: state.current_chapter.clone(),
            carryover_in_len,
            carryover_out_len: state.carryover_text.chars().count(),
            carryover_applied_hint: outcome.carryover_applied_hint,
        });

        let emitted = outcome.chunks.len();
        out.chunks.extend(outcome.chunks);
        if let Some(cb) = progress {
            cb.on_batch_complete(batch_index, total, emitted);
        }
    }

    Ok(out)
}

/// Turn extracted pages into the final document using `service`.
///
/// This is the whole core without any PDF or provider I/O, so it can be
/// driven by any [`CompletionService`].
pub async fn chunk_pages(
    service: &dyn CompletionService,
    pages: Vec<PageText>,
    source: SourceInfo,
    config: &ChunkingConfig,
) -> Result<DocumentResult, Pdf2ChunksError> {
    config.validate()?;

    let pages = limit_pages(pages, config.page_limit());
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(Pdf2ChunksError::EmptyDocument {
            input: describe_source(&source),
            pages: pages.len(),
        });
    }

    let batches = page_batches(&pages, config.pages_per_batch)?;
    if let Some(cb) = &config.progress_callback {
        cb.on_conversion_start(batches.len());
    }

    let driven = drive_batches(service, &batches, config).await?;
    let assembly = assemble(&driven.chunks, &config.book_id);

    let title = if driven.title_guess.is_empty() {
        fallback_title(&pages)
    } else {
        driven.title_guess
    };

    if let Some(cb) = &config.progress_callback {
        cb.on_conversion_complete(batches.len(), assembly.chunks.len());
    }

    Ok(DocumentResult {
        book_id: config.book_id.clone(),
        title,
        source,
        llm: LlmSettings {
            provider: config.provider_name.clone().or_else(|| service.provider()),
            model: config.model.clone().unwrap_or_else(|| service.model()),
            pages_per_batch: config.pages_per_batch,
            max_chunk_words_target: config.max_chunk_words,
            request_delay_seconds: config.request_delay_secs,
            max_retries: config.max_retries,
        },
        stats: DocumentStats {
            pages_total: pages.len(),
            chapters_total: assembly.chapters.len(),
            chunks_total: assembly.chunks.len(),
        },
        chapters: assembly.chapters,
        chunks: assembly.chunks,
        carryover_batches: driven.diagnostics,
        limits: config.page_limit().map(|max_pages| Limits { max_pages }),
    })
}

/// First non-empty line of the first page, else [`UNTITLED_BOOK`].
pub fn fallback_title(pages: &[PageText]) -> String {
    pages
        .first()
        .and_then(|p| p.text.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(|line| truncate_chars(line, MAX_TITLE_CHARS))
        .unwrap_or_else(|| UNTITLED_BOOK.to_string())
}

fn describe_source(source: &SourceInfo) -> String {
    match source {
        SourceInfo::LocalFile { path } => format!("'{path}'"),
        SourceInfo::Url { url } => format!("'{url}'"),
        SourceInfo::Bytes => "in-memory PDF".to_string(),
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Default model per provider when none is configured.
fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" | "google" => Some("gemini-2.5-flash-lite"),
        "openai" => Some("gpt-4.1-nano"),
        _ => None,
    }
}

fn create_provider(
    provider_name: &str,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, Pdf2ChunksError> {
    let model = model.or_else(|| default_model(provider_name)).ok_or_else(|| {
        Pdf2ChunksError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: "No default model for this provider; pass --model.".to_string(),
        }
    })?;
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2ChunksError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` — a pre-built provider, used as-is.
/// 2. `config.provider_name` (+ `config.model`).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. `GEMINI_API_KEY`, then `OPENAI_API_KEY`, then full auto-detection.
pub fn resolve_provider(config: &ChunkingConfig) -> Result<Arc<dyn LLMProvider>, Pdf2ChunksError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model.as_deref());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, Some(&model));
        }
    }

    for (var, provider) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(var).is_ok_and(|key| !key.trim().is_empty()) {
            return create_provider(provider, config.model.as_deref());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2ChunksError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
