//! Page capture loop: walk one opened item page by page.
//!
//! ```text
//!   OPENING ──▶ CAPTURING ──▶ ADVANCING ──advanced──▶ CAPTURING
//!      │            │             ├──exhausted──▶ DONE
//!      │            │             └──failed─────┐
//!      └──error─────┴──error────────────────────▼
//!                                           RECOVERING ──advanced──▶ CAPTURING
//!                                                 ├──exhausted──▶ DONE
//!                                                 └──failed─────▶ ABORTED
//! ```
//!
//! Every pass through `CAPTURING` either moves the cursor forward or ends
//! the loop, so a run never spins on a single page. Before capturing, a
//! session reset runs whenever `pages_since_reset` has reached the configured
//! interval on any page after the first; its failures are logged and do not
//! interrupt capture.
//!
//! Artifacts are staged in strictly increasing page order. The only repeated
//! index is the page re-rendered after a reset, which overwrites itself.

use crate::config::{AdvanceFailurePolicy, ArchiveConfig};
use crate::error::CaptureError;
use crate::output::{CaptureOutcome, CaptureReport};
use crate::pipeline::capture;
use crate::pipeline::staging::StagingStore;
use crate::session::{AdvanceOutcome, RenderingSession, SessionError};
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// States of the capture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Opening,
    Capturing,
    Advancing,
    Recovering,
    Done,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Done | LoopState::Aborted)
    }
}

/// Mutable cursor over the open item. Owned by the loop alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    pub current_page_index: u32,
    pub pages_since_reset: u32,
    pub has_more_pages: bool,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self {
            current_page_index: 1,
            pages_since_reset: 0,
            has_more_pages: true,
        }
    }
}

impl CaptureSession {
    /// Move to the next page index after a successful advance.
    fn step(&mut self) {
        self.current_page_index += 1;
        self.pages_since_reset += 1;
    }

    /// Whether a reset is due before capturing the current page.
    pub fn reset_due(&self, interval: u32) -> bool {
        self.current_page_index > 1 && self.pages_since_reset >= interval
    }
}

/// Drive `session` from the first page to exhaustion, staging into `store`.
///
/// Never returns an error: per-page failures are recorded in the report and
/// every artifact staged before an abort stays in `store`.
pub async fn run_capture_loop<S: RenderingSession>(
    session: &mut S,
    store: &StagingStore,
    config: &ArchiveConfig,
    item_name: &str,
) -> CaptureReport {
    let mut runner = LoopRunner {
        session,
        store,
        config,
        item_name,
        cursor: CaptureSession::default(),
        report: CaptureReport::default(),
    };
    let final_state = runner.run().await;

    let mut report = runner.report;
    report.outcome = if final_state == LoopState::Done {
        CaptureOutcome::Done
    } else {
        CaptureOutcome::Aborted
    };
    // A cancelled cursor points at a page that was never attempted.
    report.last_page_index = if report.cancelled {
        runner.cursor.current_page_index.saturating_sub(1)
    } else {
        runner.cursor.current_page_index
    };

    info!(
        "\"{}\": capture {:?} after {} page(s), {} error(s), {} reset(s)",
        item_name,
        report.outcome,
        report.pages_captured.len(),
        report.page_errors.len(),
        report.resets
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_capture_complete(&report);
    }
    report
}

struct LoopRunner<'a, S> {
    session: &'a mut S,
    store: &'a StagingStore,
    config: &'a ArchiveConfig,
    item_name: &'a str,
    cursor: CaptureSession,
    report: CaptureReport,
}

impl<S: RenderingSession> LoopRunner<'_, S> {
    async fn run(&mut self) -> LoopState {
        let mut state = LoopState::Opening;
        while !state.is_terminal() {
            let next = match state {
                LoopState::Opening => self.open_first_page().await,
                LoopState::Capturing => self.capture_step().await,
                LoopState::Advancing => self.advance_step().await,
                LoopState::Recovering => self.recover_step().await,
                LoopState::Done | LoopState::Aborted => state,
            };
            debug!(
                "\"{}\" page {}: {:?} → {:?}",
                self.item_name, self.cursor.current_page_index, state, next
            );
            state = next;
        }
        state
    }

    // ── OPENING ─────────────────────────────────────────────────────────

    async fn open_first_page(&mut self) -> LoopState {
        let marker = self.session.first_page_marker();
        match self.session.navigate_to_marker(&marker).await {
            Ok(()) => LoopState::Capturing,
            Err(e) => {
                self.record_error(CaptureError::OpenFailed {
                    page: self.cursor.current_page_index,
                    detail: e.to_string(),
                });
                LoopState::Recovering
            }
        }
    }

    // ── CAPTURING ───────────────────────────────────────────────────────

    async fn capture_step(&mut self) -> LoopState {
        if self.cancelled() {
            warn!(
                "\"{}\": cancelled at page {}",
                self.item_name, self.cursor.current_page_index
            );
            self.report.cancelled = true;
            return LoopState::Aborted;
        }

        if self.cursor.reset_due(self.config.reset_interval) {
            self.reset_session().await;
        }

        match self.capture_current().await {
            Ok(()) => LoopState::Advancing,
            Err(e) => {
                self.record_error(e);
                LoopState::Recovering
            }
        }
    }

    async fn capture_current(&mut self) -> Result<(), CaptureError> {
        let page = self.cursor.current_page_index;
        let wait = self.config.surface_ready_wait;

        match tokio::time::timeout(wait, self.session.wait_until_ready()).await {
            Err(_) => {
                return Err(CaptureError::SurfaceTimeout {
                    page,
                    secs: wait.as_secs_f64(),
                })
            }
            Ok(Err(e)) => return Err(session_error(page, e)),
            Ok(Ok(())) => {}
        }

        let surface = self
            .session
            .current_surface()
            .await
            .map_err(|e| session_error(page, e))?;
        let image = capture::capture_page(surface, page, self.config.scale_factor).await?;

        self.store
            .put(page, &image.png)
            .await
            .map_err(|e| CaptureError::Stage {
                page,
                detail: e.to_string(),
            })?;

        if let Err(pos) = self.report.pages_captured.binary_search(&page) {
            self.report.pages_captured.insert(pos, page);
        }
        info!("✓ \"{}\" page {} saved", self.item_name, page);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_captured(page, image.png.len());
        }
        Ok(())
    }

    /// Reload the viewer and return to the page it was showing.
    async fn reset_session(&mut self) {
        let page = self.cursor.current_page_index;
        self.report.resets += 1;
        self.cursor.pages_since_reset = 0;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_session_reset(page);
        }

        match self.reload_and_return().await {
            Ok(()) => info!("\"{}\": session reset before page {}", self.item_name, page),
            Err(e) => {
                self.report.failed_resets += 1;
                warn!(
                    "\"{}\": session reset before page {} failed: {}",
                    self.item_name, page, e
                );
            }
        }
    }

    async fn reload_and_return(&mut self) -> Result<(), SessionError> {
        let marker = self.session.current_marker().await?;
        self.session.reset().await?;
        tokio::time::sleep(self.config.reload_settle_wait).await;
        self.session.navigate_to_marker(&marker).await
    }

    // ── ADVANCING ───────────────────────────────────────────────────────

    async fn advance_step(&mut self) -> LoopState {
        if self.cap_reached() {
            return LoopState::Done;
        }

        match self.session.advance().await {
            AdvanceOutcome::Advanced => {
                self.cursor.step();
                LoopState::Capturing
            }
            AdvanceOutcome::Exhausted => {
                self.cursor.has_more_pages = false;
                LoopState::Done
            }
            AdvanceOutcome::Failed(detail) => match self.config.advance_failure {
                AdvanceFailurePolicy::EndOfItem => {
                    info!(
                        "\"{}\": advance after page {} failed ({}); treating as end of item",
                        self.item_name, self.cursor.current_page_index, detail
                    );
                    self.cursor.has_more_pages = false;
                    LoopState::Done
                }
                AdvanceFailurePolicy::Retry => {
                    self.record_error(CaptureError::AdvanceFailed {
                        page: self.cursor.current_page_index,
                        detail,
                    });
                    LoopState::Recovering
                }
            },
        }
    }

    // ── RECOVERING ──────────────────────────────────────────────────────

    async fn recover_step(&mut self) -> LoopState {
        if self.cap_reached() {
            return LoopState::Done;
        }
        let page = self.cursor.current_page_index;
        match self.session.advance().await {
            AdvanceOutcome::Advanced => {
                self.cursor.step();
                info!(
                    "\"{}\": recovered past page {}, continuing at page {}",
                    self.item_name, page, self.cursor.current_page_index
                );
                LoopState::Capturing
            }
            AdvanceOutcome::Exhausted => {
                self.cursor.has_more_pages = false;
                LoopState::Done
            }
            AdvanceOutcome::Failed(detail) => {
                error!(
                    "\"{}\": recovery advance after page {} failed: {}; aborting with {} page(s) staged",
                    self.item_name,
                    page,
                    detail,
                    self.report.pages_captured.len()
                );
                LoopState::Aborted
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn record_error(&mut self, e: CaptureError) {
        error!("❌ \"{}\": {}", self.item_name, e);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_error(e.page(), &e.to_string());
        }
        self.report.page_errors.push(e);
    }

    fn cap_reached(&self) -> bool {
        match self.config.max_pages {
            Some(cap) if self.cursor.current_page_index >= cap => {
                info!("\"{}\": page cap {} reached", self.item_name, cap);
                true
            }
            _ => false,
        }
    }

    fn cancelled(&self) -> bool {
        self.config
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn session_error(page: u32, e: SessionError) -> CaptureError {
    CaptureError::Session {
        page,
        detail: e.to_string(),
    }
}
