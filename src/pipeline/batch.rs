//! Page batching: cap the page list, then cut it into fixed-size windows.

use crate::error::Pdf2ChunksError;
use crate::output::PageText;

/// Keep only the first `max_pages` pages. `None` or `Some(0)` keeps all.
pub fn limit_pages(mut pages: Vec<PageText>, max_pages: Option<usize>) -> Vec<PageText> {
    if let Some(n) = max_pages.filter(|&n| n > 0) {
        pages.truncate(n);
    }
    pages
}

/// Split `pages` into contiguous, ordered batches of `pages_per_batch`.
///
/// The last batch may be shorter. An empty page list yields no batches.
pub fn page_batches(
    pages: &[PageText],
    pages_per_batch: usize,
) -> Result<Vec<&[PageText]>, Pdf2ChunksError> {
    if pages_per_batch == 0 {
        return Err(Pdf2ChunksError::InvalidConfig(
            "pages_per_batch must be ≥ 1".into(),
        ));
    }
    Ok(pages.chunks(pages_per_batch).collect())
}
