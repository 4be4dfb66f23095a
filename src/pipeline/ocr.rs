//! OCR fallback: transcribe thin pages with a vision model.
//!
//! Scanned books often carry no text layer, or only a page number. For
//! those pages [`crate::pipeline::extract`] hands over a rasterised image,
//! which is PNG-encoded here and sent to the same provider that does the
//! chunking. The OCR text replaces the native text only when it has more
//! words. OCR is best-effort: a failed page keeps its native text and the
//! run continues.

use crate::config::ChunkingConfig;
use crate::output::PageText;
use crate::pipeline::completion::{strip_code_fence, RetryPolicy};
use crate::pipeline::extract::word_count;
use crate::prompts::OCR_SYSTEM_PROMPT;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retries per OCR page; OCR is an enhancement, so it gives up early.
const OCR_RETRIES: u32 = 2;

/// Encode a rasterised page as a base64 PNG for the vision API.
///
/// PNG keeps glyph edges crisp; JPEG artefacts on small type hurt
/// transcription accuracy.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Transcribe one page image. Returns the error text on failure.
pub async fn ocr_page(
    provider: &Arc<dyn LLMProvider>,
    page_number: usize,
    image: ImageData,
    config: &ChunkingConfig,
) -> Result<String, String> {
    let messages = vec![
        ChatMessage::system(OCR_SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = CompletionOptions {
        temperature: Some(0.0),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };
    let policy = RetryPolicy::from_config(config);

    let mut last_err = String::from("Unknown error");
    for attempt in 0..=OCR_RETRIES {
        if attempt > 0 {
            let backoff = policy.backoff(attempt - 1);
            warn!(
                "Page {}: OCR retry {}/{} after {}ms",
                page_number,
                attempt,
                OCR_RETRIES,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: OCR {} input tokens, {} output tokens",
                    page_number, response.prompt_tokens, response.completion_tokens
                );
                return Ok(strip_code_fence(&response.content).to_string());
            }
            Err(e) => {
                last_err = e.to_string();
                warn!("Page {}: OCR attempt {} failed — {}", page_number, attempt + 1, last_err);
            }
        }
    }

    Err(last_err)
}

/// OCR every candidate page concurrently and keep the richer text.
///
/// Returns how many pages were replaced.
pub async fn apply_ocr(
    provider: &Arc<dyn LLMProvider>,
    pages: &mut [PageText],
    candidates: Vec<(usize, DynamicImage)>,
    config: &ChunkingConfig,
) -> usize {
    if candidates.is_empty() {
        return 0;
    }
    info!("Running OCR on {} page(s)", candidates.len());

    let results: Vec<(usize, Result<String, String>)> =
        stream::iter(candidates.into_iter().map(|(page_number, img)| {
            let provider = Arc::clone(provider);
            async move {
                let image = match encode_page(&img) {
                    Ok(data) => data,
                    Err(e) => return (page_number, Err(format!("image encoding failed: {e}"))),
                };
                (page_number, ocr_page(&provider, page_number, image, config).await)
            }
        }))
        .buffer_unordered(config.ocr_concurrency.max(1))
        .collect()
        .await;

    let mut replaced = 0;
    for (page_number, result) in results {
        let Some(page) = pages.iter_mut().find(|p| p.page_number == page_number) else {
            continue;
        };
        match result {
            Ok(text) => {
                let text = text.trim();
                if prefer_ocr(&page.text, text) {
                    debug!(
                        "Page {}: OCR text kept ({} → {} words)",
                        page_number,
                        word_count(&page.text),
                        word_count(text)
                    );
                    page.text = text.to_string();
                    replaced += 1;
                }
            }
            Err(e) => warn!("Page {}: OCR failed, keeping native text: {}", page_number, e),
        }
    }
    replaced
}

/// OCR wins only with strictly more words than the native text.
pub fn prefer_ocr(native: &str, ocr: &str) -> bool {
    word_count(ocr) > word_count(native)
}
