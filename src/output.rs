//! Output types: the chunk/chapter document and its per-batch diagnostics.
//!
//! Field names and nesting mirror the JSON artifact consumed downstream
//! (TTS workers, the reader client), so renaming a field here is a breaking
//! change for every consumer.

use serde::{Deserialize, Serialize};

/// Kind of a chunk: a heading-only marker or spoken body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    ChapterTitle,
    Content,
}

impl ChunkKind {
    /// Interpret a model-supplied kind. Anything but `chapter_title` is content.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("chapter_title") {
            ChunkKind::ChapterTitle
        } else {
            ChunkKind::Content
        }
    }
}

/// Extracted text of one PDF page (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

impl PageText {
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A validated chunk record produced by one batch, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChunk {
    pub chunk_kind: ChunkKind,
    pub chapter_title: String,
    pub page_start: usize,
    pub page_end: usize,
    pub text: String,
}

/// A chapter with the page span of every chunk assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: String,
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
}

/// A final, id-stamped chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_kind: ChunkKind,
    pub book_id: String,
    pub chapter_id: String,
    pub chapter_title: String,
    pub page_start: usize,
    pub page_end: usize,
    pub text: String,
}

/// Chapter/carryover state seen around one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDiagnostics {
    /// 1-indexed batch position.
    pub batch_index: usize,
    pub page_start: usize,
    pub page_end: usize,
    pub current_chapter_in: String,
    pub current_chapter_out: String,
    pub carryover_in_len: usize,
    pub carryover_out_len: usize,
    /// Advisory only; `false` flags a suspected dropped carryover.
    pub carryover_applied_hint: bool,
}

/// Where the PDF came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceInfo {
    LocalFile { path: String },
    Url { url: String },
    Bytes,
}

/// Model settings echoed into the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub model: String,
    pub pages_per_batch: usize,
    pub max_chunk_words_target: usize,
    pub request_delay_seconds: f64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub pages_total: usize,
    pub chapters_total: usize,
    pub chunks_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_pages: usize,
}

/// The finished document: the single artifact a conversion produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub book_id: String,
    pub title: String,
    pub source: SourceInfo,
    pub llm: LlmSettings,
    /// Ordered by `(start_page, chapter_id)`.
    pub chapters: Vec<Chapter>,
    /// Emission order.
    pub chunks: Vec<Chunk>,
    pub carryover_batches: Vec<BatchDiagnostics>,
    pub stats: DocumentStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
}

impl DocumentResult {
    /// Pretty JSON with a trailing newline, as written to disk.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut s = serde_json::to_string_pretty(self)?;
        s.push('\n');
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_kind_parse_is_lenient() {
        assert_eq!(ChunkKind::parse_lenient(" Chapter_Title "), ChunkKind::ChapterTitle);
        assert_eq!(ChunkKind::parse_lenient("content"), ChunkKind::Content);
        assert_eq!(ChunkKind::parse_lenient("footnote"), ChunkKind::Content);
        assert_eq!(ChunkKind::parse_lenient(""), ChunkKind::Content);
    }

    #[test]
    fn source_serialises_with_type_tag() {
        let v = serde_json::to_value(SourceInfo::LocalFile {
            path: "/tmp/a.pdf".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "local_file");
        assert_eq!(v["path"], "/tmp/a.pdf");

        let v = serde_json::to_value(SourceInfo::Url {
            url: "https://x/y.pdf".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "url");
    }

    #[test]
    fn limits_and_provider_omitted_when_absent() {
        let doc = DocumentResult {
            book_id: "b".into(),
            title: "T".into(),
            source: SourceInfo::Bytes,
            llm: LlmSettings {
                provider: None,
                model: "m".into(),
                pages_per_batch: 3,
                max_chunk_words_target: 260,
                request_delay_seconds: 0.0,
                max_retries: 6,
            },
            chapters: vec![],
            chunks: vec![],
            carryover_batches: vec![],
            stats: DocumentStats {
                pages_total: 0,
                chapters_total: 0,
                chunks_total: 0,
            },
            limits: None,
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert!(v.get("limits").is_none());
        assert!(v["llm"].get("provider").is_none());
        assert_eq!(v["llm"]["max_chunk_words_target"], 260);
        assert!(doc.to_json_pretty().unwrap().ends_with("}\n"));
    }
}
