//! Batch processing: prompt one page window, then validate what comes back.
//!
//! The model is stateless, so each call receives the chapter and carryover
//! state left behind by the previous batch and returns the state for the
//! next one. Its answer is untrusted input: every record goes through
//! [`normalize_chunks`] before it reaches the assembler, which guarantees
//!
//! - no record with empty text survives,
//! - `batch_first ≤ page_start ≤ page_end ≤ batch_last`,
//! - chapter titles are at most [`MAX_TITLE_CHARS`] characters.

use crate::error::Pdf2ChunksError;
use crate::output::{ChunkKind, PageText, RawChunk};
use crate::pipeline::completion::{complete_with_retry, CompletionService, RetryPolicy};
use crate::prompts::{batch_response_schema, chunk_batch_prompt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

/// Maximum characters kept for a chapter title.
pub const MAX_TITLE_CHARS: usize = 160;

/// Leading characters of the carryover compared against the next batch.
const CARRYOVER_COMPARE_CHARS: usize = 80;

/// State threaded from one batch to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryState {
    /// Chapter in effect at the batch boundary; empty means unknown.
    pub current_chapter: String,
    /// Trailing incomplete text from the previous batch; empty means none.
    pub carryover_text: String,
}

/// One chunk exactly as the model produced it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelChunk {
    #[serde(default)]
    pub chunk_kind: Option<String>,
    #[serde(default)]
    pub chapter_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_page")]
    pub page_start: Option<i64>,
    #[serde(default, deserialize_with = "lenient_page")]
    pub page_end: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Page numbers arrive as `3`, `3.0`, or `"3"`; anything else counts as missing
/// and is defaulted by [`normalize_chunks`].
fn lenient_page<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(page_number_from_value))
}

fn page_number_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().and_then(whole_number)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
        }
        _ => None,
    }
}

fn whole_number(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

/// A whole batch response exactly as the model produced it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelBatchResponse {
    #[serde(default)]
    pub book_title_guess: Option<String>,
    #[serde(default)]
    pub current_chapter_out: Option<String>,
    #[serde(default)]
    pub carryover_text: Option<String>,
    pub chunks: Vec<ModelChunk>,
}

impl ModelBatchResponse {
    /// Check the parsed value against the response shape.
    pub fn from_value(value: Value, batch: usize) -> Result<Self, Pdf2ChunksError> {
        let raw = value.to_string();
        serde_json::from_value(value).map_err(|e| {
            debug!("Batch {}: schema mismatch: {}", batch, e);
            Pdf2ChunksError::StructuredOutput { batch, raw }
        })
    }
}

/// Normalised result of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub book_title_guess: String,
    pub current_chapter_out: String,
    pub carryover_text: String,
    pub chunks: Vec<RawChunk>,
    /// Advisory: `false` when the first chunk does not seem to continue the
    /// incoming carryover.
    pub carryover_applied_hint: bool,
}

/// Settings a batch call needs besides its pages and state.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub max_chunk_words: usize,
    pub retry: RetryPolicy,
}

/// Run one batch through the completion service.
///
/// `batch_index` is 1-indexed and only used to tag errors and logs.
pub async fn process_batch(
    service: &dyn CompletionService,
    batch: &[PageText],
    state: &CarryState,
    settings: &BatchSettings,
    batch_index: usize,
) -> Result<BatchOutcome, Pdf2ChunksError> {
    let (first_page, last_page) = match (batch.first(), batch.last()) {
        (Some(first), Some(last)) => (first.page_number, last.page_number),
        _ => {
            return Err(Pdf2ChunksError::Internal(format!(
                "batch {batch_index} has no pages"
            )))
        }
    };

    let prompt = chunk_batch_prompt(
        batch,
        &state.current_chapter,
        &state.carryover_text,
        settings.max_chunk_words,
    );
    debug!(
        "Batch {}: pages {}-{}, prompt {} chars",
        batch_index,
        first_page,
        last_page,
        prompt.len()
    );

    let value = complete_with_retry(
        service,
        &prompt,
        &batch_response_schema(),
        &settings.retry,
        batch_index,
    )
    .await?;
    let response = ModelBatchResponse::from_value(value, batch_index)?;

    let received = response.chunks.len();
    let chunks = normalize_chunks(response.chunks, first_page, last_page);
    if chunks.len() < received {
        debug!(
            "Batch {}: dropped {} empty chunk(s)",
            batch_index,
            received - chunks.len()
        );
    }

    let carryover_applied_hint = carryover_applied(
        chunks.first().map(|c| c.text.as_str()),
        &state.carryover_text,
    );
    if !carryover_applied_hint {
        warn!(
            "Batch {}: first chunk does not continue the carryover text",
            batch_index
        );
    }

    Ok(BatchOutcome {
        book_title_guess: trimmed(response.book_title_guess),
        current_chapter_out: trimmed(response.current_chapter_out),
        carryover_text: trimmed(response.carryover_text),
        chunks,
        carryover_applied_hint,
    })
}

/// Validate and clamp model chunks for a batch spanning `first_page..=last_page`.
pub fn normalize_chunks(
    raw: Vec<ModelChunk>,
    first_page: usize,
    last_page: usize,
) -> Vec<RawChunk> {
    let first = first_page as i64;
    let last = last_page.max(first_page) as i64;

    raw.into_iter()
        .filter_map(|chunk| {
            let chunk_kind = ChunkKind::parse_lenient(chunk.chunk_kind.as_deref().unwrap_or(""));
            let mut chapter_title = chunk.chapter_title.unwrap_or_default().trim().to_string();
            let text = chunk
                .text
                .unwrap_or_default()
                .replace('\0', " ")
                .trim()
                .to_string();

            if text.is_empty() {
                return None;
            }
            if chunk_kind == ChunkKind::ChapterTitle && chapter_title.is_empty() {
                chapter_title = text.clone();
            }

            let start_raw = chunk.page_start.unwrap_or(first);
            let end_raw = chunk.page_end.unwrap_or(start_raw);
            let page_start = start_raw.clamp(first, last);
            let page_end = end_raw.min(last).max(page_start);

            Some(RawChunk {
                chunk_kind,
                chapter_title: truncate_chars(&chapter_title, MAX_TITLE_CHARS),
                page_start: page_start as usize,
                page_end: page_end as usize,
                text,
            })
        })
        .collect()
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs, trim, lower-case.
pub fn normalize_for_compare(text: &str) -> String {
    RE_WHITESPACE
        .replace_all(text, " ")
        .trim()
        .to_lowercase()
}

/// Whether `first_chunk` appears to start with the incoming carryover.
///
/// True when there is nothing to compare (no carryover, or no chunk).
pub fn carryover_applied(first_chunk: Option<&str>, carryover_in: &str) -> bool {
    let Some(first_chunk) = first_chunk else {
        return true;
    };
    if carryover_in.trim().is_empty() {
        return true;
    }
    let head: String = normalize_for_compare(carryover_in)
        .chars()
        .take(CARRYOVER_COMPARE_CHARS)
        .collect();
    !head.is_empty() && normalize_for_compare(first_chunk).starts_with(&head)
}

/// First `max` characters of `s` (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn trimmed(s: Option<String>) -> String {
    s.map(|s| s.trim().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use async_trait::async_trait;
    use serde_json::json;

    fn chunk(
        kind: &str,
        title: &str,
        start: Option<i64>,
        end: Option<i64>,
        text: &str,
    ) -> ModelChunk {
        ModelChunk {
            chunk_kind: Some(kind.into()),
            chapter_title: Some(title.into()),
            page_start: start,
            page_end: end,
            text: Some(text.into()),
        }
    }

    #[test]
    fn empty_text_is_dropped_for_every_kind() {
        let out = normalize_chunks(
            vec![
                chunk("content", "", None, None, "   "),
                chunk("chapter_title", "Ch 1", None, None, "\0 \0"),
                chunk("content", "", None, None, "kept"),
            ],
            1,
            3,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "kept");
    }

    #[test]
    fn nul_characters_become_spaces() {
        let out = normalize_chunks(vec![chunk("content", "", None, None, "a\0b ")], 1, 1);
        assert_eq!(out[0].text, "a b");
    }

    #[test]
    fn chapter_title_falls_back_to_text() {
        let heading = chunk(" Chapter_Title ", "  ", None, None, "Chapter One");
        let out = normalize_chunks(vec![heading], 2, 4);
        assert_eq!(out[0].chunk_kind, ChunkKind::ChapterTitle);
        assert_eq!(out[0].chapter_title, "Chapter One");
    }

    #[test]
    fn missing_pages_default_to_batch_start() {
        let out = normalize_chunks(vec![chunk("content", "", None, None, "x")], 7, 9);
        assert_eq!((out[0].page_start, out[0].page_end), (7, 7));

        let out = normalize_chunks(vec![chunk("content", "", Some(8), None, "x")], 7, 9);
        assert_eq!((out[0].page_start, out[0].page_end), (8, 8));
    }

    #[test]
    fn pages_are_clamped_into_batch() {
        let cases = [
            (Some(-5), Some(100), (4, 6)),
            (Some(100), Some(1), (6, 6)),
            (Some(5), Some(2), (5, 5)),
            (Some(0), None, (4, 4)),
            (None, Some(6), (4, 6)),
            (Some(i64::MAX), Some(i64::MIN), (6, 6)),
        ];
        for (start, end, expected) in cases {
            let out = normalize_chunks(vec![chunk("content", "", start, end, "x")], 4, 6);
            let got = (out[0].page_start, out[0].page_end);
            assert_eq!(got, expected, "start={start:?} end={end:?}");
            assert!(4 <= got.0 && got.0 <= got.1 && got.1 <= 6);
        }
    }

    #[test]
    fn whole_number_floats_are_accepted_as_pages() {
        let value = json!({
            "chunks": [
                { "chunk_kind": "content", "page_start": 1.0, "page_end": 2.0, "text": "a" },
                { "chunk_kind": "content", "page_start": "2", "page_end": 1.5, "text": "b" },
                { "chunk_kind": "content", "page_start": true, "page_end": null, "text": "c" }
            ]
        });
        let response = ModelBatchResponse::from_value(value, 1).unwrap();
        assert_eq!(response.chunks[0].page_start, Some(1));
        assert_eq!(response.chunks[0].page_end, Some(2));
        assert_eq!(response.chunks[1].page_start, Some(2));
        assert_eq!(response.chunks[1].page_end, None);
        assert_eq!(response.chunks[2].page_start, None);

        let out = normalize_chunks(response.chunks, 1, 3);
        let pages: Vec<(usize, usize)> = out.iter().map(|c| (c.page_start, c.page_end)).collect();
        assert_eq!(pages, vec![(1, 2), (2, 2), (1, 1)]);
    }

    #[test]
    fn long_titles_are_truncated_by_chars() {
        let title = "é".repeat(200);
        let out = normalize_chunks(vec![chunk("content", &title, None, None, "x")], 1, 1);
        assert_eq!(out[0].chapter_title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn unknown_kind_becomes_content() {
        let out = normalize_chunks(vec![chunk("footnote", "", None, None, "x")], 1, 1);
        assert_eq!(out[0].chunk_kind, ChunkKind::Content);
    }

    #[test]
    fn carryover_hint_matches_continuation() {
        assert!(carryover_applied(Some("there lived a brave knight"), "there lived"));
        assert!(carryover_applied(Some("There   LIVED\na knight"), " there lived "));
        assert!(!carryover_applied(Some("A brand new paragraph starts here"), "there lived"));
    }

    #[test]
    fn carryover_hint_true_without_data() {
        assert!(carryover_applied(None, "there lived"));
        assert!(carryover_applied(Some("anything"), "   "));
        assert!(carryover_applied(Some("anything"), ""));
    }

    #[test]
    fn carryover_hint_compares_only_the_head() {
        let carry = format!("{} tail that never appears", "a".repeat(80));
        let first = format!("{} something else entirely", "a".repeat(80));
        assert!(carryover_applied(Some(&first), &carry));
    }

    #[test]
    fn non_object_response_is_a_structured_output_error() {
        let err = ModelBatchResponse::from_value(json!(["not", "an", "object"]), 4).unwrap_err();
        assert!(matches!(err, Pdf2ChunksError::StructuredOutput { batch: 4, .. }));

        let err = ModelBatchResponse::from_value(json!({"book_title_guess": "x"}), 1).unwrap_err();
        assert!(matches!(err, Pdf2ChunksError::StructuredOutput { .. }));
    }

    #[test]
    fn nulls_are_tolerated() {
        let r = ModelBatchResponse::from_value(
            json!({"book_title_guess": null, "current_chapter_out": null, "carryover_text": null,
                   "chunks": [{"chunk_kind": "content", "chapter_title": null, "text": "hi"}]}),
            1,
        )
        .unwrap();
        assert_eq!(r.chunks.len(), 1);
    }

    struct Canned(Value);

    #[async_trait]
    impl CompletionService for Canned {
        async fn complete(&self, _prompt: &str, _schema: &Value) -> Result<Value, CompletionError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn process_batch_trims_state_and_flags_lost_carryover() {
        let service = Canned(json!({
            "book_title_guess": "  The Book ",
            "current_chapter_out": " Chapter Two ",
            "carryover_text": " and so ",
            "chunks": [
                {"chunk_kind": "content", "chapter_title": "Chapter Two",
                 "page_start": 3, "page_end": 9, "text": "A brand new paragraph starts here"}
            ]
        }));
        let pages = vec![PageText::new(3, "a"), PageText::new(4, "b")];
        let state = CarryState {
            current_chapter: "Chapter One".into(),
            carryover_text: "there lived".into(),
        };
        let settings = BatchSettings {
            max_chunk_words: 260,
            retry: RetryPolicy::immediate(0),
        };

        let out = process_batch(&service, &pages, &state, &settings, 2).await.unwrap();
        assert_eq!(out.book_title_guess, "The Book");
        assert_eq!(out.current_chapter_out, "Chapter Two");
        assert_eq!(out.carryover_text, "and so");
        assert_eq!(out.chunks[0].page_end, 4);
        assert!(!out.carryover_applied_hint);
    }
}
