//! Item and catalog orchestration.
//!
//! [`archive_item`] runs the full per-item flow against an already
//! authenticated session:
//!
//! ```text
//! clean staging ─▶ open ─▶ capture loop ─▶ assemble ─▶ backup
//! ```
//!
//! [`run_catalog`] wraps it in the interactive loop: list, select, archive,
//! return to the catalog, repeat until the operator quits.
//!
//! Per-item failures never end the catalog loop. Only errors for which
//! [`ArchiveError::is_fatal`] holds are returned from [`run_catalog`].

use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, AssemblyWarning};
use crate::output::{CaptureOutcome, ItemSummary};
use crate::pipeline::assemble::{plan_document, resolve_writer, write_document};
use crate::pipeline::backup::{backup_staged, sanitize_filename};
use crate::pipeline::page_loop::run_capture_loop;
use crate::pipeline::staging::StagingStore;
use crate::session::{Catalog, Item, RenderingSession};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Archive one item: capture every page, assemble the document, back up the
/// staged pages.
///
/// Returns `Ok` even when the capture loop aborted or assembly failed; the
/// summary records what happened. Errors are returned only when the item
/// could not be opened or its staged pages could not be secured.
pub async fn archive_item<S: RenderingSession>(
    session: &mut S,
    item: &Item,
    config: &ArchiveConfig,
) -> Result<ItemSummary, ArchiveError> {
    let start = Instant::now();
    let name = item.display_name.as_str();
    let sanitized_name = sanitize_filename(name);
    info!("Archiving \"{}\" as {}", name, sanitized_name);

    // ── Step 1: Staging store ────────────────────────────────────────────
    let staging_err = |source| ArchiveError::StagingFailed {
        path: config.staging_dir.clone(),
        source,
    };
    let store = StagingStore::open(&config.staging_dir)
        .await
        .map_err(staging_err)?;
    store.discard_stale().await.map_err(staging_err)?;

    // ── Step 2: Open ─────────────────────────────────────────────────────
    session
        .open(item)
        .await
        .map_err(|source| ArchiveError::Session {
            step: "Opening item",
            source,
        })?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_item_start(name);
    }

    // ── Step 3: Capture ──────────────────────────────────────────────────
    let capture = run_capture_loop(session, &store, config, name).await;
    if capture.outcome == CaptureOutcome::Aborted {
        warn!(
            "\"{}\": capture aborted; assembling the {} page(s) staged so far",
            name,
            capture.captured_count()
        );
    }

    let mut summary = ItemSummary {
        name: name.to_string(),
        sanitized_name: sanitized_name.clone(),
        capture,
        document: None,
        document_pages: 0,
        assembly_warnings: Vec::new(),
        document_error: None,
        backup: None,
        duration_ms: 0,
    };

    if store.is_empty().await.map_err(staging_err)? {
        warn!("\"{}\": no pages staged; skipping assembly and backup", name);
    } else {
        // ── Step 4: Assemble ─────────────────────────────────────────────
        match assemble(&store, config, &sanitized_name).await {
            Ok((path, pages, warnings)) => {
                summary.document = Some(path);
                summary.document_pages = pages;
                summary.assembly_warnings = warnings;
            }
            Err(e) => {
                error!("\"{}\": document not written: {}", name, e);
                summary.document_error = Some(e.to_string());
            }
        }

        // ── Step 5: Backup ───────────────────────────────────────────────
        let receipt = match backup_staged(&store, &config.backup_dir, name).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // Staging is wiped before the next item; keep these pages out of its reach.
                match store.set_aside(&sanitized_name).await {
                    Ok(kept) => error!(
                        "\"{}\": backup failed; staged pages kept in {}",
                        name,
                        kept.display()
                    ),
                    Err(move_err) => error!(
                        "\"{}\": backup failed and staged pages in {} could not be set aside ({}); they will be discarded with the next item",
                        name,
                        store.dir().display(),
                        move_err
                    ),
                }
                return Err(e);
            }
        };
        summary.backup = Some(receipt.path);
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "\"{}\" finished: {} page(s) captured, {} in document, {}ms",
        name,
        summary.capture.captured_count(),
        summary.document_pages,
        summary.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_item_complete(&summary);
    }
    Ok(summary)
}

async fn assemble(
    store: &StagingStore,
    config: &ArchiveConfig,
    name: &str,
) -> Result<(PathBuf, usize, Vec<AssemblyWarning>), ArchiveError> {
    let (doc, warnings) = plan_document(store, config.canvas).await?;
    if doc.is_empty() {
        return Err(ArchiveError::AssemblyFailed {
            path: config.output_dir.join(name),
            detail: "no staged page could be decoded".to_string(),
        });
    }
    let path = write_document(resolve_writer(config), &doc, &config.output_dir, name).await?;
    Ok((path, doc.page_count(), warnings))
}

// ── Selection ────────────────────────────────────────────────────────────

/// Picks the next item to archive.
pub trait Selector {
    /// Choose one of `items`, or `None` to stop.
    fn select(&mut self, items: &[Item]) -> Result<Option<Item>, ArchiveError>;
}

/// A parsed line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Quit,
    /// Zero-based position in the listed items.
    Pick(usize),
    Invalid,
}

/// Parse operator input against a list of `count` items.
///
/// Accepts `q` / `quit` (any case) or a 1-based item number.
pub fn parse_selection(input: &str, count: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Selection::Quit;
    }
    match input.parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Selection::Pick(n - 1),
        _ => Selection::Invalid,
    }
}

/// Interactive multi-item loop over a catalog.
///
/// The cancel flag is re-armed before each item, so a cancelled item does
/// not cut short the ones picked after it. Returns the summaries of every
/// item processed, in order.
pub async fn run_catalog<S, P>(
    session: &mut S,
    selector: &mut P,
    config: &ArchiveConfig,
) -> Result<Vec<ItemSummary>, ArchiveError>
where
    S: RenderingSession + Catalog,
    P: Selector,
{
    let mut summaries = Vec::new();

    let result = loop {
        let items = match session.list_items().await {
            Ok(items) => items,
            Err(source) => {
                break Err(ArchiveError::Session {
                    step: "Listing catalog",
                    source,
                })
            }
        };
        if items.is_empty() {
            break Err(ArchiveError::EmptyCatalog);
        }
        info!("Catalog lists {} item(s)", items.len());

        let item = match selector.select(&items) {
            Ok(Some(item)) => item,
            Ok(None) => {
                info!("Selection ended by operator");
                break Ok(());
            }
            Err(e) => break Err(e),
        };

        // A cancel request covers the item in flight only.
        if let Some(ref flag) = config.cancel {
            if flag.swap(false, Ordering::SeqCst) {
                debug!("Dropped cancel request raised before \"{}\" started", item.display_name);
            }
        }

        match archive_item(session, &item, config).await {
            Ok(summary) => summaries.push(summary),
            Err(e) if e.is_fatal() => break Err(e),
            Err(e) => error!("\"{}\" failed: {}", item.display_name, e),
        }

        if let Err(e) = session.return_to_catalog().await {
            break Err(ArchiveError::SelectionBoundary {
                item: item.display_name.clone(),
                detail: e.to_string(),
            });
        }
    };

    // Best-effort: a failed item may have left pages behind.
    if let Ok(store) = StagingStore::open(&config.staging_dir).await {
        if let Err(e) = store.clear().await {
            warn!("Could not clear staging store: {}", e);
        }
    }

    result.map(|()| summaries)
}
