//! Result types produced by an archiving run.

use crate::error::{AssemblyWarning, CaptureError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal state reached by the page capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureOutcome {
    /// The viewer reported no further page (or the page cap was reached).
    #[default]
    Done,
    /// An unrecoverable failure or a cancellation stopped the loop.
    Aborted,
}

/// What the capture loop did for one item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Terminal state.
    pub outcome: CaptureOutcome,
    /// Page indices staged during the run, ascending and unique.
    pub pages_captured: Vec<u32>,
    /// Per-page failures, in the order they happened.
    pub page_errors: Vec<CaptureError>,
    /// Session resets attempted.
    pub resets: u32,
    /// Session resets whose reload or re-navigation failed.
    pub failed_resets: u32,
    /// Page index the cursor was on when the loop stopped.
    pub last_page_index: u32,
    /// The loop stopped because the cancellation flag was raised.
    pub cancelled: bool,
}

impl CaptureReport {
    /// Number of distinct pages staged.
    pub fn captured_count(&self) -> usize {
        self.pages_captured.len()
    }

    /// Indices between 1 and the last cursor position that were never staged.
    pub fn skipped_pages(&self) -> Vec<u32> {
        (1..=self.last_page_index)
            .filter(|p| self.pages_captured.binary_search(p).is_err())
            .collect()
    }
}

/// Everything produced for one item: capture report, document, backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    /// Display name as listed by the catalog.
    pub name: String,
    /// Filesystem-safe form of the name used for the document and backup.
    pub sanitized_name: String,
    /// Capture loop outcome.
    pub capture: CaptureReport,
    /// Path of the assembled document, if one was written.
    pub document: Option<PathBuf>,
    /// Pages placed into the document.
    pub document_pages: usize,
    /// Artifacts left out of the document.
    pub assembly_warnings: Vec<AssemblyWarning>,
    /// Why no document was written, when assembly failed outright.
    pub document_error: Option<String>,
    /// Directory holding the archived page artifacts.
    pub backup: Option<PathBuf>,
    /// Wall-clock time for the whole item.
    pub duration_ms: u64,
}
