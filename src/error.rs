//! Error types for the folio-archive library.
//!
//! Three kinds of failure are kept apart:
//!
//! * [`ArchiveError`] — **Fatal** for the step that raised it. Missing
//!   credentials and a lost catalog view end the whole run; everything else
//!   ends only the current item.
//!
//! * [`CaptureError`] — **Non-fatal**: one page could not be captured. The
//!   capture loop records it in [`crate::output::CaptureReport`] and tries to
//!   move past the page.
//!
//! * [`AssemblyWarning`] — **Non-fatal**: one staged artifact could not be
//!   decoded while building the output document. The page is left out.

use crate::session::SessionError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folio-archive library.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // ── Preconditions ─────────────────────────────────────────────────────
    /// A required credential was not supplied.
    #[error("Missing credential {name}\nSet it in the environment or pass it on the command line.")]
    MissingCredential { name: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The viewer profile file could not be read or parsed.
    #[error("Invalid viewer profile '{path}': {detail}")]
    InvalidProfile { path: PathBuf, detail: String },

    // ── Browser / session ─────────────────────────────────────────────────
    /// The browser could not be started or attached to.
    #[error("Failed to start browser: {0}")]
    BrowserLaunch(String),

    /// A one-shot session step (login, opening an item) failed.
    #[error("{step} failed: {source}")]
    Session {
        step: &'static str,
        #[source]
        source: SessionError,
    },

    /// The catalog listed no selectable items.
    #[error("No items found in the catalog")]
    EmptyCatalog,

    /// The viewer could not be brought back to the catalog after an item.
    #[error("Could not return to the catalog after '{item}': {detail}")]
    SelectionBoundary { item: String, detail: String },

    // ── Storage ───────────────────────────────────────────────────────────
    /// The staging directory could not be created, read or cleared.
    #[error("Staging store error at '{path}': {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving staged artifacts into the backup location failed.
    #[error("Backup to '{path}' failed: {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium ────────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Document assembly needs the pdfium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium rejected an operation while building the document.
    #[error("PDF assembly failed for '{path}': {detail}")]
    AssemblyFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// Whether this error must stop the multi-item loop.
    ///
    /// Only precondition failures and a lost catalog boundary escalate;
    /// every per-item failure lets the operator pick the next item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::MissingCredential { .. }
                | ArchiveError::InvalidConfig(_)
                | ArchiveError::InvalidProfile { .. }
                | ArchiveError::BrowserLaunch(_)
                | ArchiveError::EmptyCatalog
                | ArchiveError::SelectionBoundary { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::CaptureReport::page_errors`]. The capture loop
/// reacts to it with one advance retry.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum CaptureError {
    /// The viewer exposed no renderable surface.
    #[error("Page {page}: no rendered surface available")]
    NoSurface { page: u32 },

    /// The surface did not become ready within the configured wait.
    #[error("Page {page}: surface not ready after {secs:.1}s")]
    SurfaceTimeout { page: u32, secs: f64 },

    /// The rendering session reported an error while reading the page.
    #[error("Page {page}: session error: {detail}")]
    Session { page: u32, detail: String },

    /// The surface raster could not be decoded, scaled or re-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    Encode { page: u32, detail: String },

    /// The artifact could not be written into the staging store.
    #[error("Page {page}: staging write failed: {detail}")]
    Stage { page: u32, detail: String },

    /// The advance instruction failed after the page was captured.
    #[error("Page {page}: advance failed: {detail}")]
    AdvanceFailed { page: u32, detail: String },

    /// Positioning the viewer on the first page failed.
    #[error("Page {page}: could not open first page: {detail}")]
    OpenFailed { page: u32, detail: String },
}

impl CaptureError {
    /// The 1-based page index the error refers to.
    pub fn page(&self) -> u32 {
        match self {
            CaptureError::NoSurface { page }
            | CaptureError::SurfaceTimeout { page, .. }
            | CaptureError::Session { page, .. }
            | CaptureError::Encode { page, .. }
            | CaptureError::Stage { page, .. }
            | CaptureError::AdvanceFailed { page, .. }
            | CaptureError::OpenFailed { page, .. } => *page,
        }
    }
}

/// A staged artifact that was left out of the output document.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[error("Page {page}: skipped during assembly: {detail}")]
pub struct AssemblyWarning {
    pub page: u32,
    pub detail: String,
}
