//! CLI binary for folio-archive.
//!
//! A thin shim over the library crate: maps CLI flags to `ArchiveConfig`,
//! starts the browser, signs in and runs the interactive catalog loop.

use anyhow::{Context, Result};
use clap::Parser;
use folio_archive::session::cdp::{Browser, LaunchOptions, DEFAULT_DEBUG_PORT};
use folio_archive::session::viewer::{ViewerProfile, ViewerSession};
use folio_archive::{
    parse_selection, run_catalog, AdvanceFailurePolicy, ArchiveConfig, ArchiveError,
    CaptureOutcome, CaptureProgressCallback, CaptureReport, Credentials, Item, ItemSummary,
    ProgressCallback, Selection, Selector,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner per item plus one line per page event.
///
/// The page count of an item is unknown until the reader runs out of pages,
/// so the bar counts up rather than towards a total.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
    show_bar: bool,
}

impl CliProgressCallback {
    fn new(show_bar: bool) -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            show_bar,
        })
    }

    /// Print above the bar when one is active, else straight to stderr.
    fn line(&self, msg: String) {
        match self.bar.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(bar) => bar.println(msg),
                None => eprintln!("{msg}"),
            },
            Err(_) => eprintln!("{msg}"),
        }
    }
}

impl CaptureProgressCallback for CliProgressCallback {
    fn on_item_start(&self, name: &str) {
        self.line(format!("{} {}", cyan("◆"), bold(&format!("Capturing \"{name}\"…"))));
        if !self.show_bar {
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  {pos:>4} pages  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
        );
        bar.set_prefix("Capturing");
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_page_captured(&self, page: u32, bytes: usize) {
        self.line(format!(
            "  {} Page {:>4}  {}",
            green("✓"),
            page,
            dim(&format!("{:>8} KiB", bytes / 1024)),
        ));
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                bar.inc(1);
                bar.set_message(format!("page {page}"));
            }
        }
    }

    fn on_page_error(&self, page: u32, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.line(format!("  {} Page {:>4}  {}", red("✗"), page, red(&msg)));
    }

    fn on_session_reset(&self, page: u32) {
        self.line(format!(
            "  {} {}",
            cyan("↻"),
            dim(&format!("Reloading viewer before page {page}"))
        ));
    }

    fn on_capture_complete(&self, _report: &CaptureReport) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn on_item_complete(&self, summary: &ItemSummary) {
        print_summary(summary);
    }
}

fn print_summary(s: &ItemSummary) {
    let outcome = match s.capture.outcome {
        CaptureOutcome::Done if s.capture.cancelled => yellow("cancelled"),
        CaptureOutcome::Done => green("complete"),
        CaptureOutcome::Aborted if s.capture.cancelled => yellow("cancelled"),
        CaptureOutcome::Aborted => red("aborted"),
    };
    let skipped = s.capture.skipped_pages();
    let skipped = if skipped.is_empty() {
        "none".to_string()
    } else {
        skipped
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let document = match (&s.document, &s.document_error) {
        (Some(p), _) => p.display().to_string(),
        (None, Some(e)) => red(e),
        (None, None) => dim("not written"),
    };
    let backup = s
        .backup
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| dim("none"));

    let rule = "─".repeat(58);
    eprintln!("┌{rule}");
    eprintln!("│ {}", bold(&s.name));
    eprintln!("├{rule}");
    eprintln!("│ Outcome     {outcome}");
    eprintln!(
        "│ Pages       {} captured, {} in document",
        s.capture.captured_count(),
        s.document_pages
    );
    eprintln!("│ Skipped     {skipped}");
    eprintln!(
        "│ Resets      {} ({} failed)",
        s.capture.resets, s.capture.failed_resets
    );
    eprintln!("│ Document    {document}");
    eprintln!("│ Backup      {backup}");
    eprintln!("│ Duration    {:.1}s", s.duration_ms as f64 / 1000.0);
    eprintln!("└{rule}");
}

// ── Interactive selection ────────────────────────────────────────────────────

/// Prompts on stderr and reads the choice from stdin.
struct StdinSelector;

impl Selector for StdinSelector {
    fn select(&mut self, items: &[Item]) -> Result<Option<Item>, ArchiveError> {
        eprintln!("\n{}", bold("📚 Available books:"));
        for (i, item) in items.iter().enumerate() {
            eprintln!("{} ({})", item.display_name, i + 1);
        }
        eprintln!();

        loop {
            eprint!("Select book number (or q to quit): ");
            io::stderr().flush().ok();

            let mut line = String::new();
            let read = tokio::task::block_in_place(|| io::stdin().lock().read_line(&mut line))
                .map_err(|e| ArchiveError::Internal(format!("Failed to read selection: {e}")))?;
            if read == 0 {
                return Ok(None);
            }

            match parse_selection(&line, items.len()) {
                Selection::Quit => return Ok(None),
                Selection::Pick(i) => return Ok(items.get(i).cloned()),
                Selection::Invalid => eprintln!("Invalid selection, please try again"),
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Launch Chrome, sign in, pick books interactively
  FOLIO_USER=me@example.com FOLIO_PASS=secret folio

  # Headless, into a dedicated output directory
  folio --headless --output-dir ~/Books

  # Reuse a browser started with --remote-debugging-port=9222
  folio --attach http://127.0.0.1:9222

  # A reader deployment with different locators
  folio --profile my-reader.json

  # Quick trial on the first 5 pages of each book
  folio --max-pages 5 -v

OUTPUT LAYOUT:
  ./imgs/N.png              staged page images of the book in flight
  <output-dir>/<name>.pdf   assembled document (A4, one image per page)
  ./save/<name>/N.png       page images moved here after assembly
                            (<name>_2, <name>_3, … if already present)

ENVIRONMENT VARIABLES:
  FOLIO_USER              Account identifier (required)
  FOLIO_PASS              Account secret (required)
  FOLIO_CHROME            Browser executable
  PDFIUM_LIB_PATH         libpdfium file or the directory holding it
  RUST_LOG                Log filter, overrides -v / -q

CANCELLING:
  Ctrl-C once stops the current book after the current page; the pages
  captured so far are still assembled and backed up, then the selection
  prompt returns. Ctrl-C again before the next book starts exits immediately.
"#;

/// Archive the pages of a web book reader into PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    about = "Archive the pages of a canvas-based web book reader into PDF documents",
    long_about = "Drive a canvas-based online book reader through Chrome, capture every page \
at a higher resolution, and assemble each book into a PDF. Page images are kept as a backup.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Account identifier.
    #[arg(long, env = "FOLIO_USER")]
    user: Option<String>,

    /// Account secret.
    #[arg(long, env = "FOLIO_PASS", hide_env_values = true)]
    pass: Option<String>,

    /// Browser executable (Chrome, Chromium, Edge).
    #[arg(long, env = "FOLIO_CHROME")]
    chrome: Option<PathBuf>,

    /// Attach to a running browser's DevTools HTTP endpoint instead of launching one.
    #[arg(long, env = "FOLIO_ATTACH", conflicts_with = "chrome")]
    attach: Option<String>,

    /// Run the launched browser without a window.
    #[arg(long, env = "FOLIO_HEADLESS")]
    headless: bool,

    /// DevTools port for the launched browser.
    #[arg(long, env = "FOLIO_DEBUG_PORT", default_value_t = DEFAULT_DEBUG_PORT)]
    debug_port: u16,

    /// JSON viewer profile (URLs and element locators).
    #[arg(long, env = "FOLIO_PROFILE")]
    profile: Option<PathBuf>,

    /// Capture upscale factor (0–8].
    #[arg(long, env = "FOLIO_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Reload the viewer every N pages.
    #[arg(long, env = "FOLIO_RESET_INTERVAL", default_value_t = 10)]
    reset_interval: u32,

    /// Wait after each navigation, in milliseconds.
    #[arg(long, env = "FOLIO_NAVIGATION_WAIT_MS", default_value_t = 3000)]
    navigation_wait_ms: u64,

    /// Upper bound on waiting for a page to render, in milliseconds.
    #[arg(long, env = "FOLIO_SURFACE_WAIT_MS", default_value_t = 6000)]
    surface_wait_ms: u64,

    /// Settle delay after a viewer reload, in milliseconds.
    #[arg(long, env = "FOLIO_RELOAD_WAIT_MS", default_value_t = 5000)]
    reload_wait_ms: u64,

    /// Staging directory for page images.
    #[arg(long, env = "FOLIO_STAGING_DIR", default_value = "./imgs")]
    staging_dir: PathBuf,

    /// Backup root for page images.
    #[arg(long, env = "FOLIO_BACKUP_DIR", default_value = "./save")]
    backup_dir: PathBuf,

    /// Directory for assembled PDFs.
    #[arg(short, long, env = "FOLIO_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Stop each book after this many pages.
    #[arg(long, env = "FOLIO_MAX_PAGES",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Treat a failed "next page" as the end of the book instead of retrying once.
    #[arg(long, env = "FOLIO_STOP_ON_ADVANCE_FAILURE")]
    stop_on_advance_failure: bool,

    /// libpdfium file or the directory that holds it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print item summaries as JSON on stdout when done.
    #[arg(long, env = "FOLIO_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "FOLIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FOLIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the selection prompt.
    #[arg(short, long, env = "FOLIO_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep library INFO lines out of the way of the spinner; the per-page
    // lines printed by the callback carry the same information.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Preconditions ────────────────────────────────────────────────────
    // Checked before any browser starts.
    let credentials = Credentials::from_values(cli.user.clone(), cli.pass.clone())?;
    let profile = match cli.profile {
        Some(ref path) => ViewerProfile::load(path)?,
        None => ViewerProfile::default(),
    };

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.swap(true, Ordering::SeqCst) {
                    eprintln!("\n{} Interrupted again, exiting", red("✘"));
                    std::process::exit(130);
                }
                eprintln!(
                    "\n{} Stopping after the current page (Ctrl-C again to exit now)",
                    yellow("⚠")
                );
            }
        });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        let cb = CliProgressCallback::new(show_progress);
        Some(cb as Arc<dyn CaptureProgressCallback>)
    };
    let config = build_config(&cli, progress_cb, Arc::clone(&cancel))?;

    // ── Browser + login ──────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!("{} {}", cyan("◆"), bold("Starting browser…"));
    }
    let browser = match cli.attach {
        Some(ref endpoint) => Browser::attach(endpoint.clone()),
        None => {
            let opts = LaunchOptions {
                executable: cli.chrome.clone(),
                headless: cli.headless,
                port: cli.debug_port,
                window: (profile.viewport.width, profile.viewport.height),
            };
            Browser::launch(&opts)
                .await
                .map_err(|e| ArchiveError::BrowserLaunch(e.to_string()))?
        }
    };
    let client = browser
        .connect_page()
        .await
        .map_err(|e| ArchiveError::BrowserLaunch(e.to_string()))?;
    let mut viewer = ViewerSession::new(client, profile, &config)
        .await
        .map_err(|source| ArchiveError::Session {
            step: "Preparing viewer",
            source,
        })?;

    if !cli.quiet {
        eprintln!("{} {}", cyan("◆"), bold("Signing in…"));
    }
    viewer
        .login(&credentials)
        .await
        .map_err(|source| ArchiveError::Session {
            step: "Login",
            source,
        })?;
    if !cli.quiet {
        eprintln!("{} Signed in as {}", green("✔"), credentials.username);
    }

    // ── Catalog loop ─────────────────────────────────────────────────────
    let result = run_catalog(&mut viewer, &mut StdinSelector, &config).await;
    browser.close().await;
    let summaries = result.context("Archiving stopped")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialise summaries")?
        );
    }
    if !cli.quiet {
        let documents = summaries.iter().filter(|s| s.document.is_some()).count();
        eprintln!(
            "{}  {} book(s) processed, {} document(s) written",
            if documents == summaries.len() {
                green("✔")
            } else {
                cyan("⚠")
            },
            summaries.len(),
            documents
        );
    }

    Ok(())
}

/// Map CLI args to `ArchiveConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
) -> Result<ArchiveConfig> {
    let mut builder = ArchiveConfig::builder()
        .scale_factor(cli.scale)
        .reset_interval(cli.reset_interval)
        .navigation_wait(Duration::from_millis(cli.navigation_wait_ms))
        .surface_ready_wait(Duration::from_millis(cli.surface_wait_ms))
        .reload_settle_wait(Duration::from_millis(cli.reload_wait_ms))
        .staging_dir(&cli.staging_dir)
        .backup_dir(&cli.backup_dir)
        .output_dir(&cli.output_dir)
        .cancel_flag(cancel);

    if cli.stop_on_advance_failure {
        builder = builder.advance_failure(AdvanceFailurePolicy::EndOfItem);
    }
    if let Some(n) = cli.max_pages {
        builder = builder.max_pages(n);
    }
    if let Some(ref p) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
