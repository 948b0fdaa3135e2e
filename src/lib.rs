//! # folio-archive
//!
//! Archive the pages of a canvas-based web book reader into PDF documents.
//!
//! ## Why this crate?
//!
//! Some online readers only ever show a book one rendered `<canvas>` at a
//! time: there is no download, no text layer, nothing to print. This crate
//! drives the reader page by page, reads each canvas back at a higher
//! resolution, and stitches the pages into one PDF per book, keeping the
//! page images as a backup.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Catalog
//!  │
//!  ├─ 1. Select  list the library, pick an item (interactive)
//!  ├─ 2. Open    open the item, jump to the cover marker
//!  ├─ 3. Capture walk pages: wait → read canvas → upscale → stage N.png
//!  │             (session reset every N pages, one-step recovery on error)
//!  ├─ 4. Assemble fit every staged page onto an A4 canvas → <name>.pdf
//!  └─ 5. Backup  move staged pages to save/<name>/ and clear staging
//! ```
//!
//! The core only talks to the reader through [`session::RenderingSession`]
//! and [`session::Catalog`]; [`session::viewer::ViewerSession`] implements
//! both over the Chrome DevTools Protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_archive::session::cdp::{Browser, LaunchOptions};
//! use folio_archive::session::viewer::{ViewerProfile, ViewerSession};
//! use folio_archive::{archive_item, ArchiveConfig, Catalog, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ArchiveConfig::default();
//!     let credentials = Credentials::from_env()?;
//!
//!     let browser = Browser::launch(&LaunchOptions::default()).await?;
//!     let client = browser.connect_page().await?;
//!     let mut viewer = ViewerSession::new(client, ViewerProfile::default(), &config).await?;
//!     viewer.login(&credentials).await?;
//!
//!     let items = viewer.list_items().await?;
//!     let summary = archive_item(&mut viewer, &items[0], &config).await?;
//!     eprintln!("{} pages → {:?}", summary.capture.captured_count(), summary.document);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folio` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! folio-archive = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{archive_item, parse_selection, run_catalog, Selection, Selector};
pub use config::{AdvanceFailurePolicy, ArchiveConfig, ArchiveConfigBuilder, Credentials, PageCanvas};
pub use error::{ArchiveError, AssemblyWarning, CaptureError};
pub use output::{CaptureOutcome, CaptureReport, ItemSummary};
pub use pipeline::assemble::{DocumentWriter, OutputDocument, OutputPage, PdfiumWriter};
pub use progress::{CaptureProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{
    AdvanceOutcome, Catalog, Item, ItemHandle, PageMarker, RenderingSession, SessionError, Surface,
};
