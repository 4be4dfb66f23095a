//! Chunk/chapter assembly: stamp ids and build the chapter index.
//!
//! Chapter identity is the normalised title (whitespace collapsed,
//! lower-cased). Chapters are only ever appended and widened, so the index is
//! a plain `Vec<Chapter>` arena plus a title → position map; chunks carry the
//! chapter id string, never a reference.

use crate::output::{Chapter, Chunk, ChunkKind, RawChunk};
use crate::pipeline::segment::{normalize_for_compare, truncate_chars, MAX_TITLE_CHARS};
use std::collections::HashMap;

/// Title used until the first real chapter is seen.
pub const UNKNOWN_CHAPTER: &str = "Unknown Chapter";

/// Assigned chunks and the chapter list, sorted by `(start_page, chapter_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assembly {
    pub chunks: Vec<Chunk>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Default)]
struct ChapterIndex {
    chapters: Vec<Chapter>,
    by_key: HashMap<String, usize>,
}

impl ChapterIndex {
    /// Find or create the chapter for `title`, widening its page span.
    fn resolve(&mut self, title: &str, page_start: usize, page_end: usize) -> String {
        let title = match title.trim() {
            "" => UNKNOWN_CHAPTER,
            t => t,
        };
        let key = normalize_for_compare(title);

        if let Some(&pos) = self.by_key.get(&key) {
            let chapter = &mut self.chapters[pos];
            chapter.start_page = chapter.start_page.min(page_start);
            chapter.end_page = chapter.end_page.max(page_end);
            return chapter.chapter_id.clone();
        }

        let chapter_id = format!("chapter_{:03}", self.chapters.len() + 1);
        self.by_key.insert(key, self.chapters.len());
        self.chapters.push(Chapter {
            chapter_id: chapter_id.clone(),
            title: truncate_chars(title, MAX_TITLE_CHARS),
            start_page: page_start,
            end_page: page_end,
        });
        chapter_id
    }
}

/// Assign chunk and chapter ids to `raw` in order.
///
/// The current chapter changes on a `chapter_title` record (its text, else
/// its `chapter_title` field) or on any record with a non-empty
/// `chapter_title`. It never goes back to [`UNKNOWN_CHAPTER`].
pub fn assemble(raw: &[RawChunk], book_id: &str) -> Assembly {
    let mut index = ChapterIndex::default();
    let mut current_title = UNKNOWN_CHAPTER.to_string();
    let mut chunks = Vec::with_capacity(raw.len());

    for (n, record) in raw.iter().enumerate() {
        let named = record.chapter_title.trim();
        match record.chunk_kind {
            ChunkKind::ChapterTitle => {
                let heading = record.text.trim();
                if !heading.is_empty() {
                    current_title = heading.to_string();
                } else if !named.is_empty() {
                    current_title = named.to_string();
                }
            }
            ChunkKind::Content if !named.is_empty() => current_title = named.to_string(),
            ChunkKind::Content => {}
        }

        let chapter_id = index.resolve(&current_title, record.page_start, record.page_end);
        chunks.push(Chunk {
            chunk_id: format!("chunk_{n:05}"),
            chunk_kind: record.chunk_kind,
            book_id: book_id.to_string(),
            chapter_id,
            chapter_title: current_title.clone(),
            page_start: record.page_start,
            page_end: record.page_end,
            text: record.text.clone(),
        });
    }

    // Creation order is the id ordinal, so a stable sort on start page keeps
    // `chapter_999` before `chapter_1000`.
    let mut chapters = index.chapters;
    chapters.sort_by_key(|c| c.start_page);

    Assembly { chunks, chapters }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: ChunkKind, title: &str, start: usize, end: usize, text: &str) -> RawChunk {
        RawChunk {
            chunk_kind: kind,
            chapter_title: title.into(),
            page_start: start,
            page_end: end,
            text: text.into(),
        }
    }

    #[test]
    fn chunks_before_any_heading_land_in_unknown_chapter() {
        let a = assemble(&[raw(ChunkKind::Content, "", 1, 1, "Preface text.")], "b");
        assert_eq!(a.chapters.len(), 1);
        assert_eq!(a.chapters[0].title, UNKNOWN_CHAPTER);
        assert_eq!(a.chunks[0].chapter_title, UNKNOWN_CHAPTER);
        assert_eq!(a.chunks[0].chapter_id, "chapter_001");
    }

    #[test]
    fn heading_record_switches_chapter() {
        let a = assemble(
            &[
                raw(ChunkKind::ChapterTitle, "Chapter One", 1, 1, "Chapter One"),
                raw(ChunkKind::Content, "", 1, 2, "Body."),
                raw(ChunkKind::ChapterTitle, "", 3, 3, "Chapter Two"),
                raw(ChunkKind::Content, "", 3, 4, "More."),
            ],
            "book",
        );
        let ids: Vec<&str> = a.chunks.iter().map(|c| c.chapter_id.as_str()).collect();
        assert_eq!(ids, ["chapter_001", "chapter_001", "chapter_002", "chapter_002"]);
        assert_eq!(a.chunks[3].chapter_title, "Chapter Two");
        assert_eq!(a.chunks[3].chunk_id, "chunk_00003");
        assert!(a.chunks.iter().all(|c| c.book_id == "book"));
    }

    #[test]
    fn heading_text_wins_over_field() {
        let a = assemble(&[raw(ChunkKind::ChapterTitle, "Field", 1, 1, "Heading")], "b");
        assert_eq!(a.chapters[0].title, "Heading");
    }

    #[test]
    fn content_field_updates_chapter() {
        let a = assemble(
            &[
                raw(ChunkKind::Content, "Part I", 1, 1, "a"),
                raw(ChunkKind::Content, "", 2, 2, "b"),
                raw(ChunkKind::Content, "Part II", 3, 3, "c"),
            ],
            "b",
        );
        let titles: Vec<&str> = a.chunks.iter().map(|c| c.chapter_title.as_str()).collect();
        assert_eq!(titles, ["Part I", "Part I", "Part II"]);
    }

    #[test]
    fn normalised_titles_share_an_id() {
        let a = assemble(
            &[
                raw(ChunkKind::Content, "The  Cold Planet", 1, 1, "a"),
                raw(ChunkKind::Content, "Interlude", 2, 2, "b"),
                raw(ChunkKind::Content, "the cold\nplanet", 5, 6, "c"),
            ],
            "b",
        );
        assert_eq!(a.chunks[0].chapter_id, a.chunks[2].chapter_id);
        assert_eq!(a.chapters.len(), 2);
        let cold = a.chapters.iter().find(|c| c.chapter_id == "chapter_001").unwrap();
        assert_eq!(cold.title, "The  Cold Planet");
        assert_eq!((cold.start_page, cold.end_page), (1, 6));
    }

    #[test]
    fn chapter_span_is_min_and_max_of_its_chunks() {
        let records = [
            raw(ChunkKind::Content, "A", 4, 5, "x"),
            raw(ChunkKind::Content, "B", 6, 6, "x"),
            raw(ChunkKind::Content, "A", 2, 3, "x"),
            raw(ChunkKind::Content, "A", 9, 9, "x"),
        ];
        let a = assemble(&records, "b");
        for chapter in &a.chapters {
            let mine: Vec<&Chunk> = a
                .chunks
                .iter()
                .filter(|c| c.chapter_id == chapter.chapter_id)
                .collect();
            assert_eq!(chapter.start_page, mine.iter().map(|c| c.page_start).min().unwrap());
            assert_eq!(chapter.end_page, mine.iter().map(|c| c.page_end).max().unwrap());
        }
    }

    #[test]
    fn chapters_sorted_by_start_page_then_id() {
        let a = assemble(
            &[
                raw(ChunkKind::Content, "Late", 5, 5, "x"),
                raw(ChunkKind::Content, "Early", 1, 1, "x"),
                raw(ChunkKind::Content, "AlsoEarly", 1, 2, "x"),
            ],
            "b",
        );
        let ids: Vec<&str> = a.chapters.iter().map(|c| c.chapter_id.as_str()).collect();
        assert_eq!(ids, ["chapter_002", "chapter_003", "chapter_001"]);
        let chunk_ids: Vec<&str> = a.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(chunk_ids, ["chunk_00000", "chunk_00001", "chunk_00002"]);
    }

    #[test]
    fn chapter_order_is_numeric_past_999() {
        let titles: Vec<String> = (0..1001).map(|i| format!("Part {i}")).collect();
        let records: Vec<RawChunk> = titles
            .iter()
            .map(|t| raw(ChunkKind::Content, t, 1, 1, "x"))
            .collect();
        let a = assemble(&records, "b");
        assert_eq!(a.chapters.len(), 1001);
        assert_eq!(a.chapters[998].chapter_id, "chapter_999");
        assert_eq!(a.chapters[999].chapter_id, "chapter_1000");
        assert_eq!(a.chapters[1000].chapter_id, "chapter_1001");
    }

    #[test]
    fn chapter_record_title_is_truncated() {
        let long = "x".repeat(300);
        let a = assemble(&[raw(ChunkKind::ChapterTitle, "", 1, 1, &long)], "b");
        assert_eq!(a.chapters[0].title.len(), MAX_TITLE_CHARS);
        assert_eq!(a.chunks[0].chapter_title.len(), 300);
    }

    #[test]
    fn empty_input_produces_nothing() {
        assert_eq!(assemble(&[], "b"), Assembly::default());
    }
}
