//! Progress-callback trait for per-batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ChunkingConfigBuilder::progress_callback`] to receive
//! events as the driver walks the page batches.
//!
//! Batches are processed strictly in order, so events for batch `n + 1`
//! never arrive before `on_batch_complete` for batch `n`.
//!
//! # Example
//!
//! ```rust
//! use pdf2chunks::{ConversionProgressCallback, ChunkingConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     chunks: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch_index: usize, total_batches: usize, chunks: usize) {
//!         self.chunks.fetch_add(chunks, Ordering::SeqCst);
//!         eprintln!("batch {batch_index}/{total_batches}: {chunks} chunks");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { chunks: AtomicUsize::new(0) });
//!
//! let config = ChunkingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the driver as it processes each batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once pages are extracted and batched, before the first model call.
    fn on_conversion_start(&self, total_batches: usize) {
        let _ = total_batches;
    }

    /// Called just before a batch prompt is sent (1-indexed).
    fn on_batch_start(&self, batch_index: usize, total_batches: usize) {
        let _ = (batch_index, total_batches);
    }

    /// Called when a batch has been normalised.
    ///
    /// `chunks` is the number of records the batch contributed.
    fn on_batch_complete(&self, batch_index: usize, total_batches: usize, chunks: usize) {
        let _ = (batch_index, total_batches, chunks);
    }

    /// Called when a batch fails terminally. The run aborts right after.
    fn on_batch_error(&self, batch_index: usize, total_batches: usize, error: &str) {
        let _ = (batch_index, total_batches, error);
    }

    /// Called once after every batch succeeded and the document is assembled.
    fn on_conversion_complete(&self, total_batches: usize, chunks_total: usize) {
        let _ = (total_batches, chunks_total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ChunkingConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        chunks: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_conversion_start(&self, total_batches: usize) {
            self.total.store(total_batches, Ordering::SeqCst);
        }

        fn on_batch_start(&self, _batch_index: usize, _total_batches: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch_index: usize, _total_batches: usize, chunks: usize) {
            self.chunks.fetch_add(chunks, Ordering::SeqCst);
        }

        fn on_batch_error(&self, _batch_index: usize, _total_batches: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(2);
        cb.on_batch_start(1, 2);
        cb.on_batch_complete(1, 2, 4);
        cb.on_batch_error(2, 2, "boom");
        cb.on_conversion_complete(2, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_conversion_start(2);
        tracker.on_batch_start(1, 2);
        tracker.on_batch_complete(1, 2, 3);
        tracker.on_batch_start(2, 2);
        tracker.on_batch_error(2, 2, "quota");

        assert_eq!(tracker.total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.chunks.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
