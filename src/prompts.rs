//! Prompts and the response schema for the model calls.
//!
//! Every prompt lives here so the wording can change without touching the
//! retry or normalisation code, and so unit tests can inspect the exact
//! text a batch will send.

use crate::output::PageText;
use serde_json::{json, Value};

/// System prompt for the vision-model OCR fallback.
pub const OCR_SYSTEM_PROMPT: &str = r#"You transcribe a scanned book page image to plain text.

Rules:
- Output ONLY the text visible on the page, in reading order.
- Keep the original wording, spelling and punctuation exactly.
- Separate paragraphs with a blank line.
- Do NOT add Markdown, commentary, or "Page X" markers.
- If the page has no readable text, output nothing."#;

/// System message for the chunking call; the JSON schema is appended.
pub const CHUNKING_SYSTEM_PROMPT: &str =
    "You are a careful text-preparation assistant. Reply with a single JSON object \
     that validates against this JSON schema, with no prose and no code fences:";

/// JSON schema of one batch response.
///
/// `page_start` / `page_end` are nullable: the model may leave them out when
/// it cannot place a chunk, and normalisation fills them in.
pub fn batch_response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["book_title_guess", "current_chapter_out", "carryover_text", "chunks"],
        "properties": {
            "book_title_guess": {
                "type": "string",
                "description": "Best-effort title guess for the book, or empty string when unknown."
            },
            "current_chapter_out": {
                "type": "string",
                "description": "Chapter state after processing this page batch; reused as input for the next batch."
            },
            "carryover_text": {
                "type": "string",
                "description": "Trailing incomplete text to prepend to the next page batch, or empty string."
            },
            "chunks": {
                "type": "array",
                "description": "Ordered chunk list generated from the current page batch.",
                "items": {
                    "type": "object",
                    "required": ["chunk_kind", "chapter_title", "text"],
                    "properties": {
                        "chunk_kind": { "type": "string", "enum": ["chapter_title", "content"] },
                        "chapter_title": { "type": "string" },
                        "page_start": { "type": ["integer", "null"] },
                        "page_end": { "type": ["integer", "null"] },
                        "text": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Build the user prompt for one page batch.
///
/// `current_chapter` and `carryover_text` are the state handed over by the
/// previous batch; empty strings mean "unknown" and "none".
///
/// # Panics
/// Never; an empty batch renders an empty page range `0-0`.
pub fn chunk_batch_prompt(
    batch: &[PageText],
    current_chapter: &str,
    carryover_text: &str,
    max_chunk_words: usize,
) -> String {
    let page_min = batch.first().map(|p| p.page_number).unwrap_or(0);
    let page_max = batch.last().map(|p| p.page_number).unwrap_or(0);
    let batch_text = batch
        .iter()
        .map(|p| format!("[[PAGE {}]]\n{}", p.page_number, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You prepare clean spoken chunks for TTS from raw PDF/OCR text.

Critical rules:
- The output will be spoken aloud.
- Remove non-spoken artifacts (headers, footers, navigation labels, page furniture, URLs, cookie banners).
- Reproduce source wording exactly for kept content. Do not paraphrase, summarize, or rewrite style.
- Keep chunks semantically complete and do not cut mid-sentence.
- Target <= {max_chunk_words} words per content chunk.
- Use only page numbers from [[PAGE N]] markers.

Chapter-state rules:
- Current chapter entering this page batch: "{current_chapter}" (empty means unknown).
- If you do NOT find a new chapter heading, keep using current chapter and set current_chapter_out unchanged.
- If you find a new chapter heading:
  1) Emit a separate chunk with chunk_kind="chapter_title" where text is the heading only.
  2) Set current_chapter_out to that heading.
  3) Do NOT include heading text again in nearby content chunks.

Carryover rules:
- carryover_text_in may contain trailing incomplete text from the previous page batch.
- If carryover_text_in is non-empty, continue from it before new page content.
- Return new carryover_text only when this page batch ends with incomplete trailing text.

Return STRICT JSON only:
{{
  "book_title_guess": "string or empty",
  "current_chapter_out": "string (updated or unchanged)",
  "carryover_text": "string (possibly empty)",
  "chunks": [
    {{
      "chunk_kind": "chapter_title|content",
      "chapter_title": "chapter this chunk belongs to",
      "page_start": 1,
      "page_end": 2,
      "text": "chunk text"
    }}
  ]
}}

Page batch: {page_min}-{page_max}
current_chapter_in:
{current_chapter}

carryover_text_in:
{carryover_text}

Raw page text:
{batch_text}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<PageText> {
        vec![
            PageText::new(4, "It was a dark night."),
            PageText::new(5, "The storm kept on."),
        ]
    }

    #[test]
    fn prompt_tags_every_page() {
        let p = chunk_batch_prompt(&pages(), "", "", 260);
        assert!(p.contains("[[PAGE 4]]\nIt was a dark night."));
        assert!(p.contains("[[PAGE 5]]\nThe storm kept on."));
        assert!(p.contains("Page batch: 4-5"));
    }

    #[test]
    fn prompt_embeds_state_and_word_target() {
        let p = chunk_batch_prompt(&pages(), "Chapter Two", "and then she", 120);
        assert!(p.contains(r#"entering this page batch: "Chapter Two""#));
        assert!(p.contains("carryover_text_in:\nand then she"));
        assert!(p.contains("Target <= 120 words"));
    }

    #[test]
    fn prompt_forbids_paraphrase_and_mid_sentence_cuts() {
        let p = chunk_batch_prompt(&pages(), "", "", 260);
        assert!(p.contains("Do not paraphrase"));
        assert!(p.contains("do not cut mid-sentence"));
        assert!(p.contains(r#"chunk_kind="chapter_title""#));
    }

    #[test]
    fn schema_lists_required_fields() {
        let s = batch_response_schema();
        let required = s["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert_eq!(
            s["properties"]["chunks"]["items"]["properties"]["chunk_kind"]["enum"][0],
            "chapter_title"
        );
    }
}
