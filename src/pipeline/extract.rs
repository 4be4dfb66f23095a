//! Page text extraction via pdfium, with page images for OCR candidates.
//!
//! pdfium is not async-safe, so the whole pass runs inside
//! `tokio::task::spawn_blocking`. Each page yields its native text layer;
//! pages whose text is too thin (scans, image-only pages) are also
//! rasterised so [`crate::pipeline::ocr`] can transcribe them afterwards.

use crate::config::ChunkingConfig;
use crate::error::Pdf2ChunksError;
use crate::output::PageText;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Native text of every page plus images of the pages that need OCR.
pub struct ExtractedPages {
    /// Page count of the whole document, before any cap.
    pub document_pages: usize,
    pub pages: Vec<PageText>,
    /// `(page_number, image)` for pages below the word threshold.
    pub ocr_candidates: Vec<(usize, DynamicImage)>,
}

#[derive(Debug, Clone)]
struct ExtractOptions {
    password: Option<String>,
    max_pages: Option<usize>,
    /// `Some((min_words, max_pixels))` when OCR fallback is enabled.
    ocr: Option<(usize, u32)>,
}

/// Extract page texts, honouring the page cap and OCR settings in `config`.
pub async fn extract_pages(
    pdf_path: &Path,
    config: &ChunkingConfig,
) -> Result<ExtractedPages, Pdf2ChunksError> {
    let path = pdf_path.to_path_buf();
    let options = ExtractOptions {
        password: config.password.clone(),
        max_pages: config.page_limit(),
        ocr: config
            .ocr
            .then_some((config.min_words_before_ocr, config.max_rendered_pixels)),
    };

    tokio::task::spawn_blocking(move || extract_pages_blocking(&path, &options))
        .await
        .map_err(|e| Pdf2ChunksError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory), then `./`, then the
/// system library.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2ChunksError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(custom) = std::env::var("PDFIUM_LIB_PATH") {
        let custom = PathBuf::from(custom);
        if custom.is_dir() {
            candidates.push(PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
                &custom,
            )));
        } else {
            candidates.push(custom);
        }
    }
    candidates.push(PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
        "./",
    )));

    for lib in &candidates {
        match Pdfium::bind_to_library(lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!("pdfium not usable at {}: {:?}", lib.display(), e),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| Pdf2ChunksError::PdfiumBindingFailed(format!("{e:?}")))
}

fn extract_pages_blocking(
    pdf_path: &Path,
    options: &ExtractOptions,
) -> Result<ExtractedPages, Pdf2ChunksError> {
    let pdfium = bind_pdfium()?;
    let password = options.password.as_deref();

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                Pdf2ChunksError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2ChunksError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2ChunksError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail,
            }
        }
    })?;

    let pages = document.pages();
    let document_pages = pages.len() as usize;
    let take = options.max_pages.unwrap_or(document_pages).min(document_pages);
    info!("PDF loaded: {} pages, extracting {}", document_pages, take);

    let render_config = options.ocr.map(|(_, max_pixels)| {
        PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32)
    });

    let mut out = Vec::with_capacity(take);
    let mut ocr_candidates = Vec::new();

    for (idx, page) in pages.iter().enumerate().take(take) {
        let page_number = idx + 1;
        let text = page
            .text()
            .map_err(|e| Pdf2ChunksError::ExtractionFailed {
                page: page_number,
                detail: format!("{e:?}"),
            })?
            .all()
            .trim()
            .to_string();

        if let (Some((min_words, _)), Some(render_config)) = (options.ocr, &render_config) {
            let words = word_count(&text);
            if words < min_words {
                match page.render_with_config(render_config) {
                    Ok(bitmap) => {
                        debug!("Page {}: {} native words, queued for OCR", page_number, words);
                        ocr_candidates.push((page_number, bitmap.as_image()));
                    }
                    Err(e) => warn!("Page {}: rasterisation for OCR failed: {:?}", page_number, e),
                }
            }
        }

        out.push(PageText::new(page_number, text));
    }

    Ok(ExtractedPages {
        document_pages,
        pages: out,
        ocr_candidates,
    })
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
