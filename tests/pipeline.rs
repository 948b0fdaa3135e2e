//! Integration tests for the capture → assemble → backup pipeline.
//!
//! The reader is replaced by [`ScriptedSession`], an in-memory book whose
//! pages render as solid PNGs sized after their index, so every staged
//! artifact can be traced back to the page it came from. Documents are
//! written by [`RecordingWriter`], which keeps the page plan instead of
//! calling pdfium.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use folio_archive::{
    archive_item, run_catalog, AdvanceFailurePolicy, AdvanceOutcome, ArchiveConfig, ArchiveError,
    CaptureError, CaptureOutcome, CaptureProgressCallback, Catalog, DocumentWriter, Item,
    ItemHandle, OutputDocument, PageMarker, RenderingSession, SessionError, Selector, Surface,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Native surface size of `page`.
fn page_dims(page: u32) -> (u32, u32) {
    (10 + page, 20 + page)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([200, 180, 160, 255]),
    ));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// An in-memory book of `pages` pages.
#[derive(Default)]
struct ScriptedSession {
    pages: u32,
    position: u32,
    /// Consumed before the natural advance behaviour.
    advances: VecDeque<AdvanceOutcome>,
    /// Positions that render no surface.
    no_surface: HashSet<u32>,
    /// Positions whose readiness never resolves.
    hangs: HashSet<u32>,
    fail_first_marker: bool,
    fail_resets: bool,
    fail_open: bool,
    /// Cursor position at each reset.
    reset_at: Vec<u32>,
    opened: Vec<String>,
    // catalog
    items: Vec<Item>,
    fail_return: bool,
    returns: usize,
}

impl ScriptedSession {
    fn book(pages: u32) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }
}

impl RenderingSession for ScriptedSession {
    async fn open(&mut self, item: &Item) -> Result<(), SessionError> {
        if self.fail_open {
            return Err(SessionError::ElementNotFound("open control".into()));
        }
        self.opened.push(item.display_name.clone());
        self.position = 1;
        Ok(())
    }

    fn first_page_marker(&self) -> PageMarker {
        PageMarker::new("C1")
    }

    async fn navigate_to_marker(&mut self, marker: &PageMarker) -> Result<(), SessionError> {
        let target = match marker.as_str() {
            "C1" if self.fail_first_marker => {
                return Err(SessionError::ElementNotFound("page input".into()))
            }
            "C1" => 1,
            other => other
                .parse()
                .map_err(|_| SessionError::Script(format!("bad marker {other}")))?,
        };
        if target == 0 || target > self.pages {
            return Err(SessionError::Script(format!("no page {target}")));
        }
        self.position = target;
        Ok(())
    }

    async fn current_marker(&mut self) -> Result<PageMarker, SessionError> {
        Ok(PageMarker::new(self.position.to_string()))
    }

    async fn wait_until_ready(&mut self) -> Result<(), SessionError> {
        if self.hangs.contains(&self.position) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn current_surface(&mut self) -> Result<Option<Surface>, SessionError> {
        if self.no_surface.contains(&self.position) {
            return Ok(None);
        }
        let (width, height) = page_dims(self.position);
        Ok(Some(Surface {
            width,
            height,
            encoded: png(width, height),
        }))
    }

    async fn advance(&mut self) -> AdvanceOutcome {
        if let Some(scripted) = self.advances.pop_front() {
            if scripted == AdvanceOutcome::Advanced {
                self.position += 1;
            }
            return scripted;
        }
        if self.position < self.pages {
            self.position += 1;
            AdvanceOutcome::Advanced
        } else {
            AdvanceOutcome::Exhausted
        }
    }

    async fn reset(&mut self) -> Result<(), SessionError> {
        self.reset_at.push(self.position);
        if self.fail_resets {
            return Err(SessionError::Timeout {
                what: "reload".into(),
                secs: 30,
            });
        }
        self.position = 1;
        Ok(())
    }
}

impl Catalog for ScriptedSession {
    async fn list_items(&mut self) -> Result<Vec<Item>, SessionError> {
        Ok(self.items.clone())
    }

    async fn return_to_catalog(&mut self) -> Result<(), SessionError> {
        if self.fail_return {
            return Err(SessionError::Script("history back failed".into()));
        }
        self.returns += 1;
        Ok(())
    }
}

/// Keeps the page plan of every document it is asked to write.
#[derive(Default)]
struct RecordingWriter {
    documents: Mutex<Vec<OutputDocument>>,
}

impl RecordingWriter {
    fn page_indices(&self) -> Vec<u32> {
        let docs = self.documents.lock().unwrap();
        docs.last()
            .map(|d| d.pages.iter().map(|p| p.page_index).collect())
            .unwrap_or_default()
    }
}

impl DocumentWriter for RecordingWriter {
    fn write(&self, doc: &OutputDocument, path: &Path) -> Result<(), ArchiveError> {
        std::fs::write(path, b"%PDF-1.7\n").map_err(|e| ArchiveError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.documents.lock().unwrap().push(doc.clone());
        Ok(())
    }
}

struct Fixture {
    tmp: TempDir,
    writer: Arc<RecordingWriter>,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        Self {
            tmp: TempDir::new().unwrap(),
            writer: Arc::new(RecordingWriter::default()),
        }
    }

    fn staging(&self) -> PathBuf {
        self.tmp.path().join("imgs")
    }

    fn save(&self) -> PathBuf {
        self.tmp.path().join("save")
    }

    fn out(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    /// Zero waits, recording writer, everything under the temp dir.
    fn config(&self) -> folio_archive::ArchiveConfigBuilder {
        ArchiveConfig::builder()
            .navigation_wait(Duration::ZERO)
            .reload_settle_wait(Duration::ZERO)
            .surface_ready_wait(Duration::from_secs(5))
            .staging_dir(self.staging())
            .backup_dir(self.save())
            .output_dir(self.out())
            .writer(Arc::clone(&self.writer) as Arc<dyn DocumentWriter>)
    }
}

fn item(n: usize, name: &str) -> Item {
    Item::new(ItemHandle(n), name)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ── Single item ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_book_end_to_end() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(3);

    let summary = archive_item(&mut session, &item(1, "Book One"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Done);
    assert_eq!(summary.capture.pages_captured, vec![1, 2, 3]);
    assert!(summary.capture.page_errors.is_empty());
    assert_eq!(summary.capture.resets, 0);
    assert_eq!(summary.document_pages, 3);

    assert_eq!(fx.writer.page_indices(), vec![1, 2, 3]);
    let docs = fx.writer.documents.lock().unwrap();
    for page in &docs[0].pages {
        let (w, h) = page_dims(page.page_index);
        assert_eq!((page.pixel_width, page.pixel_height), (w * 2, h * 2));
    }
    drop(docs);

    let document = summary.document.unwrap();
    assert_eq!(document, fx.out().join("Book_One.pdf"));
    assert!(document.exists());
    assert!(!fx.out().join("Book_One.pdf.tmp").exists());

    assert_eq!(summary.backup.unwrap(), fx.save().join("Book_One"));
    assert_eq!(
        files_in(&fx.save().join("Book_One")),
        vec!["1.png", "2.png", "3.png"]
    );
    assert!(files_in(&fx.staging()).is_empty());
}

#[tokio::test]
async fn failed_advance_and_failed_recovery_abort_with_first_page() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(5);
    session.advances = VecDeque::from(vec![
        AdvanceOutcome::Failed("next button detached".into()),
        AdvanceOutcome::Failed("next button detached".into()),
    ]);

    let summary = archive_item(&mut session, &item(1, "Short"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Aborted);
    assert_eq!(summary.capture.pages_captured, vec![1]);
    assert!(matches!(
        summary.capture.page_errors.as_slice(),
        [CaptureError::AdvanceFailed { page: 1, .. }]
    ));
    // Staged pages survive the abort.
    assert_eq!(fx.writer.page_indices(), vec![1]);
    assert_eq!(files_in(&fx.save().join("Short")), vec!["1.png"]);
}

#[tokio::test]
async fn end_of_item_policy_treats_failed_advance_as_last_page() {
    let fx = Fixture::new();
    let config = fx
        .config()
        .advance_failure(AdvanceFailurePolicy::EndOfItem)
        .build()
        .unwrap();
    let mut session = ScriptedSession::book(5);
    session.advances = VecDeque::from(vec![
        AdvanceOutcome::Advanced,
        AdvanceOutcome::Failed("button gone".into()),
    ]);

    let summary = archive_item(&mut session, &item(1, "Policy"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Done);
    assert_eq!(summary.capture.pages_captured, vec![1, 2]);
    assert!(summary.capture.page_errors.is_empty());
}

#[tokio::test]
async fn twelve_pages_reset_once_before_page_eleven() {
    let fx = Fixture::new();
    let config = fx.config().reset_interval(10).build().unwrap();
    let mut session = ScriptedSession::book(12);

    let summary = archive_item(&mut session, &item(1, "Twelve"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.resets, 1);
    assert_eq!(summary.capture.failed_resets, 0);
    assert_eq!(session.reset_at, vec![11]);
    assert_eq!(summary.capture.pages_captured, (1..=12).collect::<Vec<_>>());

    // Page 11 is re-rendered after the reload and lands at index 11.
    let docs = fx.writer.documents.lock().unwrap();
    let eleven = docs[0].pages.iter().find(|p| p.page_index == 11).unwrap();
    let (w, h) = page_dims(11);
    assert_eq!((eleven.pixel_width, eleven.pixel_height), (w * 2, h * 2));
    assert_eq!(docs[0].pages.len(), 12);
}

#[tokio::test]
async fn reset_count_follows_interval() {
    for (pages, interval) in [(1, 1), (5, 1), (10, 10), (11, 10), (21, 10), (25, 3), (7, 20)] {
        let fx = Fixture::new();
        let config = fx
            .config()
            .scale_factor(1.0)
            .reset_interval(interval)
            .build()
            .unwrap();
        let mut session = ScriptedSession::book(pages);

        let summary = archive_item(&mut session, &item(1, "Resets"), &config)
            .await
            .unwrap();

        assert_eq!(
            summary.capture.resets,
            (pages - 1) / interval,
            "pages={pages} interval={interval}"
        );
        assert_eq!(summary.capture.captured_count(), pages as usize);
    }
}

#[tokio::test]
async fn failed_reset_is_counted_and_capture_continues() {
    let fx = Fixture::new();
    let config = fx.config().reset_interval(10).build().unwrap();
    let mut session = ScriptedSession::book(12);
    session.fail_resets = true;

    let summary = archive_item(&mut session, &item(1, "Flaky reload"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.resets, 1);
    assert_eq!(summary.capture.failed_resets, 1);
    assert_eq!(summary.capture.outcome, CaptureOutcome::Done);
    assert_eq!(summary.capture.pages_captured, (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn missing_surface_is_skipped_by_recovery() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(4);
    session.no_surface.insert(2);

    let summary = archive_item(&mut session, &item(1, "Gap"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Done);
    assert_eq!(summary.capture.pages_captured, vec![1, 3, 4]);
    assert_eq!(summary.capture.skipped_pages(), vec![2]);
    assert_eq!(
        summary.capture.page_errors,
        vec![CaptureError::NoSurface { page: 2 }]
    );
    assert_eq!(fx.writer.page_indices(), vec![1, 3, 4]);
}

#[tokio::test]
async fn surface_wait_is_bounded() {
    let fx = Fixture::new();
    let config = fx
        .config()
        .surface_ready_wait(Duration::from_millis(50))
        .build()
        .unwrap();
    let mut session = ScriptedSession::book(3);
    session.hangs.insert(2);

    let summary = archive_item(&mut session, &item(1, "Slow"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.pages_captured, vec![1, 3]);
    assert!(matches!(
        summary.capture.page_errors.as_slice(),
        [CaptureError::SurfaceTimeout { page: 2, .. }]
    ));
}

#[tokio::test]
async fn failed_cover_jump_recovers_by_advancing() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(3);
    session.fail_first_marker = true;

    let summary = archive_item(&mut session, &item(1, "No cover"), &config)
        .await
        .unwrap();

    assert!(matches!(
        summary.capture.page_errors.as_slice(),
        [CaptureError::OpenFailed { page: 1, .. }]
    ));
    assert_eq!(summary.capture.pages_captured, vec![2, 3]);
}

/// Overwrites one staged artifact with garbage right after it is written.
struct CorruptPage {
    page: u32,
    staging: PathBuf,
}

impl CaptureProgressCallback for CorruptPage {
    fn on_page_captured(&self, page: u32, _bytes: usize) {
        if page == self.page {
            std::fs::write(self.staging.join(format!("{page}.png")), b"\x89PNG truncated").unwrap();
        }
    }
}

#[tokio::test]
async fn unreadable_artifact_is_left_out_of_document() {
    let fx = Fixture::new();
    let cb = Arc::new(CorruptPage {
        page: 2,
        staging: fx.staging(),
    });
    let config = fx
        .config()
        .progress_callback(cb as Arc<dyn CaptureProgressCallback>)
        .build()
        .unwrap();
    let mut session = ScriptedSession::book(3);

    let summary = archive_item(&mut session, &item(1, "Damaged"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.pages_captured, vec![1, 2, 3]);
    assert_eq!(fx.writer.page_indices(), vec![1, 3]);
    assert_eq!(summary.document_pages, 2);
    assert_eq!(summary.assembly_warnings.len(), 1);
    assert_eq!(summary.assembly_warnings[0].page, 2);
    // The damaged file is still backed up.
    assert_eq!(
        files_in(&fx.save().join("Damaged")),
        vec!["1.png", "2.png", "3.png"]
    );
}

/// Raises the cancel flag once `page` is staged.
/// Raises the cancel flag the first time `page` is captured, like one Ctrl-C.
struct CancelAfter {
    page: u32,
    flag: Arc<AtomicBool>,
    fired: AtomicBool,
}

impl CancelAfter {
    fn new(page: u32, flag: &Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self {
            page,
            flag: Arc::clone(flag),
            fired: AtomicBool::new(false),
        })
    }
}

impl CaptureProgressCallback for CancelAfter {
    fn on_page_captured(&self, page: u32, _bytes: usize) {
        if page == self.page && !self.fired.swap(true, Ordering::SeqCst) {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn cancellation_aborts_and_keeps_staged_pages() {
    let fx = Fixture::new();
    let flag = Arc::new(AtomicBool::new(false));
    let cb = CancelAfter::new(2, &flag);
    let config = fx
        .config()
        .cancel_flag(flag)
        .progress_callback(cb as Arc<dyn CaptureProgressCallback>)
        .build()
        .unwrap();
    let mut session = ScriptedSession::book(6);

    let summary = archive_item(&mut session, &item(1, "Interrupted"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Aborted);
    assert!(summary.capture.cancelled);
    assert_eq!(summary.capture.pages_captured, vec![1, 2]);
    assert!(summary.capture.skipped_pages().is_empty());
    assert_eq!(fx.writer.page_indices(), vec![1, 2]);
}

#[tokio::test]
async fn page_cap_stops_without_extra_advance() {
    let fx = Fixture::new();
    let config = fx.config().max_pages(3).build().unwrap();
    let mut session = ScriptedSession::book(10);

    let summary = archive_item(&mut session, &item(1, "Capped"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Done);
    assert_eq!(summary.capture.pages_captured, vec![1, 2, 3]);
    assert!(summary.capture.skipped_pages().is_empty());
    assert_eq!(session.position, 3);
}

#[tokio::test]
async fn stale_staging_files_are_discarded_before_capture() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.staging()).unwrap();
    std::fs::write(fx.staging().join("7.png"), png(5, 5)).unwrap();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);

    archive_item(&mut session, &item(1, "Fresh"), &config)
        .await
        .unwrap();

    assert_eq!(fx.writer.page_indices(), vec![1, 2]);
}

#[tokio::test]
async fn same_title_twice_gets_separate_backups() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();

    for _ in 0..2 {
        let mut session = ScriptedSession::book(2);
        archive_item(&mut session, &item(1, "Repeat"), &config)
            .await
            .unwrap();
    }

    assert_eq!(files_in(&fx.save()), vec!["Repeat", "Repeat_2"]);
    assert_eq!(files_in(&fx.save().join("Repeat_2")), vec!["1.png", "2.png"]);
}

#[tokio::test]
async fn missing_surface_with_failed_recovery_keeps_earlier_pages() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(5);
    session.no_surface.insert(3);
    session.advances = VecDeque::from(vec![
        AdvanceOutcome::Advanced,
        AdvanceOutcome::Advanced,
        AdvanceOutcome::Failed("viewer froze".into()),
    ]);

    let summary = archive_item(&mut session, &item(1, "Frozen"), &config)
        .await
        .unwrap();

    assert_eq!(summary.capture.outcome, CaptureOutcome::Aborted);
    assert_eq!(summary.capture.pages_captured, vec![1, 2]);
    assert_eq!(
        summary.capture.page_errors,
        vec![CaptureError::NoSurface { page: 3 }]
    );
    assert_eq!(fx.writer.page_indices(), vec![1, 2]);
    assert_eq!(files_in(&fx.save().join("Frozen")), vec!["1.png", "2.png"]);
}

#[tokio::test]
async fn failed_backup_sets_staged_pages_aside() {
    let fx = Fixture::new();
    // A plain file where the backup root should be.
    let blocked = fx.tmp.path().join("blocked");
    std::fs::write(&blocked, b"").unwrap();
    let config = fx.config().backup_dir(&blocked).build().unwrap();
    let mut session = ScriptedSession::book(2);

    let err = archive_item(&mut session, &item(1, "Stuck"), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::BackupFailed { .. }));
    assert!(!err.is_fatal());

    let kept = fx.staging().join("unsaved-Stuck");
    assert_eq!(files_in(&kept), vec!["1.png", "2.png"]);

    // The next item's staging cleanup leaves them alone.
    let config = fx.config().build().unwrap();
    archive_item(&mut session, &item(2, "Next"), &config)
        .await
        .unwrap();
    assert_eq!(files_in(&kept), vec!["1.png", "2.png"]);
    assert_eq!(files_in(&fx.save().join("Next")), vec!["1.png", "2.png"]);
}

#[tokio::test]
async fn open_failure_is_an_error_for_the_item() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);
    session.fail_open = true;

    let err = archive_item(&mut session, &item(1, "Locked"), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Session { step: "Opening item", .. }));
    assert!(!err.is_fatal());
}

// ── Catalog loop ─────────────────────────────────────────────────────────────

/// Replays a fixed list of choices (0-based), then quits.
struct ScriptedSelector {
    picks: VecDeque<usize>,
}

impl Selector for ScriptedSelector {
    fn select(&mut self, items: &[Item]) -> Result<Option<Item>, ArchiveError> {
        Ok(self.picks.pop_front().and_then(|i| items.get(i).cloned()))
    }
}

fn selector(picks: &[usize]) -> ScriptedSelector {
    ScriptedSelector {
        picks: picks.iter().copied().collect(),
    }
}

#[tokio::test]
async fn catalog_loop_archives_selection_then_quits() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);
    session.items = vec![item(1, "Alpha"), item(2, "Beta")];

    let summaries = run_catalog(&mut session, &mut selector(&[1, 0]), &config)
        .await
        .unwrap();

    let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Beta", "Alpha"]);
    assert_eq!(session.opened, vec!["Beta", "Alpha"]);
    assert_eq!(session.returns, 2);
    assert!(fx.out().join("Beta.pdf").exists());
    assert!(fx.out().join("Alpha.pdf").exists());
}

#[tokio::test]
async fn cancelled_item_does_not_cancel_the_next_pick() {
    let fx = Fixture::new();
    let flag = Arc::new(AtomicBool::new(false));
    let config = fx
        .config()
        .cancel_flag(Arc::clone(&flag))
        .progress_callback(CancelAfter::new(2, &flag) as Arc<dyn CaptureProgressCallback>)
        .build()
        .unwrap();
    let mut session = ScriptedSession::book(4);
    session.items = vec![item(1, "Alpha"), item(2, "Beta")];

    let summaries = run_catalog(&mut session, &mut selector(&[0, 1]), &config)
        .await
        .unwrap();

    let [alpha, beta] = summaries.as_slice() else {
        panic!("expected two summaries, got {}", summaries.len());
    };
    assert!(alpha.capture.cancelled);
    assert_eq!(alpha.capture.pages_captured, vec![1, 2]);
    assert!(fx.out().join("Alpha.pdf").exists());

    assert!(!beta.capture.cancelled);
    assert_eq!(beta.capture.outcome, CaptureOutcome::Done);
    assert_eq!(beta.capture.pages_captured, vec![1, 2, 3, 4]);
    assert_eq!(beta.document, Some(fx.out().join("Beta.pdf")));
}

#[tokio::test]
async fn failed_return_to_catalog_is_fatal() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);
    session.items = vec![item(1, "Alpha"), item(2, "Beta")];
    session.fail_return = true;

    let err = run_catalog(&mut session, &mut selector(&[0, 1]), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::SelectionBoundary { ref item, .. } if item == "Alpha"));
    assert!(err.is_fatal());
    // The finished item's output is intact.
    assert!(fx.out().join("Alpha.pdf").exists());
    assert_eq!(session.opened, vec!["Alpha"]);
}

#[tokio::test]
async fn item_failure_does_not_stop_the_catalog_loop() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);
    session.items = vec![item(1, "Alpha")];
    session.fail_open = true;

    let summaries = run_catalog(&mut session, &mut selector(&[0, 0]), &config)
        .await
        .unwrap();

    assert!(summaries.is_empty());
    assert_eq!(session.returns, 2);
}

#[tokio::test]
async fn empty_catalog_is_reported() {
    let fx = Fixture::new();
    let config = fx.config().build().unwrap();
    let mut session = ScriptedSession::book(2);

    let err = run_catalog(&mut session, &mut selector(&[0]), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::EmptyCatalog));
}
