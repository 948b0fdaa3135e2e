//! Progress-callback trait for per-item and per-page capture events.
//!
//! Inject an [`Arc<dyn CaptureProgressCallback>`] via
//! [`crate::config::ArchiveConfigBuilder::progress_callback`] to receive
//! events as the capture loop walks an item. The library never prints; the
//! binary forwards these events to a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use folio_archive::{ArchiveConfig, CaptureProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     captured: AtomicUsize,
//! }
//!
//! impl CaptureProgressCallback for CountingCallback {
//!     fn on_page_captured(&self, page: u32, bytes: usize) {
//!         self.captured.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page} staged ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { captured: AtomicUsize::new(0) });
//!
//! let config = ArchiveConfig::builder()
//!     .progress_callback(counter as Arc<dyn CaptureProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{CaptureReport, ItemSummary};
use std::sync::Arc;

/// Called by the archiving pipeline as it processes an item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Capture is sequential, so events for one item
/// arrive in page order.
pub trait CaptureProgressCallback: Send + Sync {
    /// Called once an item is opened, before the first page is captured.
    fn on_item_start(&self, name: &str) {
        let _ = name;
    }

    /// Called after a page artifact has been staged.
    ///
    /// # Arguments
    /// * `page`  — 1-based page index
    /// * `bytes` — size of the encoded artifact
    fn on_page_captured(&self, page: u32, bytes: usize) {
        let _ = (page, bytes);
    }

    /// Called when capturing a page fails, before recovery is attempted.
    fn on_page_error(&self, page: u32, error: &str) {
        let _ = (page, error);
    }

    /// Called before the session is reset ahead of capturing `page`.
    fn on_session_reset(&self, page: u32) {
        let _ = page;
    }

    /// Called when the capture loop reaches `DONE` or `ABORTED`.
    fn on_capture_complete(&self, report: &CaptureReport) {
        let _ = report;
    }

    /// Called after assembly and backup for the item have finished.
    fn on_item_complete(&self, summary: &ItemSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CaptureProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ArchiveConfig`].
pub type ProgressCallback = Arc<dyn CaptureProgressCallback>;
