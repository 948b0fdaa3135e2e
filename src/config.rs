//! Configuration types for page capture and document assembly.
//!
//! All archiving behaviour is controlled through [`ArchiveConfig`], built via
//! its [`ArchiveConfigBuilder`]. One struct carries every knob the capture
//! loop, the assembly step and the backup step read, so a run can be logged
//! and reproduced from a single value.

use crate::error::ArchiveError;
use crate::pipeline::assemble::DocumentWriter;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for archiving items from a rendering session.
///
/// Built via [`ArchiveConfig::builder()`] or using [`ArchiveConfig::default()`].
///
/// # Example
/// ```rust
/// use folio_archive::ArchiveConfig;
///
/// let config = ArchiveConfig::builder()
///     .scale_factor(3.0)
///     .reset_interval(20)
///     .staging_dir("/tmp/folio-staging")
///     .build()
///     .unwrap();
/// assert_eq!(config.reset_interval, 20);
/// ```
#[derive(Clone)]
pub struct ArchiveConfig {
    /// Upscale factor applied to every captured surface. Range: (0, 8]. Default: 2.0.
    ///
    /// The stored artifact measures `surface.width * scale` by
    /// `surface.height * scale` pixels, resampled with a Lanczos filter.
    pub scale_factor: f32,

    /// Pages captured between two session resets. Default: 10.
    ///
    /// A reset reloads the viewer and re-navigates to the current page. It
    /// never fires on the first page.
    pub reset_interval: u32,

    /// Delay after a navigation or advance instruction. Default: 3 s.
    pub navigation_wait: Duration,

    /// Upper bound on waiting for the surface to become ready. Default: 6 s.
    pub surface_ready_wait: Duration,

    /// Settle delay after a session reload, before re-navigating. Default: 5 s.
    pub reload_settle_wait: Duration,

    /// Directory holding the per-page artifacts of the item in flight. Default: `./imgs`.
    pub staging_dir: PathBuf,

    /// Root under which each item's artifacts are archived. Default: `./save`.
    pub backup_dir: PathBuf,

    /// Directory receiving the assembled documents. Default: `.`.
    pub output_dir: PathBuf,

    /// Output page size in PDF points. Default: A4 portrait.
    pub canvas: PageCanvas,

    /// How a failed advance instruction is interpreted. Default: [`AdvanceFailurePolicy::Retry`].
    pub advance_failure: AdvanceFailurePolicy,

    /// Optional hard cap on captured page indices. Default: None.
    ///
    /// Capture ends after page `max_pages` as if the item were exhausted;
    /// the viewer is not advanced past it.
    pub max_pages: Option<u32>,

    /// Explicit pdfium library location (file or directory). Default: None.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Pre-constructed document writer. Takes precedence over the pdfium writer.
    pub writer: Option<Arc<dyn DocumentWriter>>,

    /// Optional per-page progress callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,

    /// Cancellation flag polled once per page. Default: None.
    ///
    /// Raising it moves the capture loop to `ABORTED`; staged pages are kept
    /// and still assembled and backed up.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            scale_factor: 2.0,
            reset_interval: 10,
            navigation_wait: Duration::from_millis(3000),
            surface_ready_wait: Duration::from_millis(6000),
            reload_settle_wait: Duration::from_millis(5000),
            staging_dir: PathBuf::from("./imgs"),
            backup_dir: PathBuf::from("./save"),
            output_dir: PathBuf::from("."),
            canvas: PageCanvas::default(),
            advance_failure: AdvanceFailurePolicy::default(),
            max_pages: None,
            pdfium_lib_path: None,
            writer: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("scale_factor", &self.scale_factor)
            .field("reset_interval", &self.reset_interval)
            .field("navigation_wait", &self.navigation_wait)
            .field("surface_ready_wait", &self.surface_ready_wait)
            .field("reload_settle_wait", &self.reload_settle_wait)
            .field("staging_dir", &self.staging_dir)
            .field("backup_dir", &self.backup_dir)
            .field("output_dir", &self.output_dir)
            .field("canvas", &self.canvas)
            .field("advance_failure", &self.advance_failure)
            .field("max_pages", &self.max_pages)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("writer", &self.writer.as_ref().map(|_| "<dyn DocumentWriter>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn CaptureProgressCallback>"),
            )
            .field(
                "cancel",
                &self.cancel.as_ref().map(|flag| flag.load(Ordering::Relaxed)),
            )
            .finish()
    }
}

impl ArchiveConfig {
    /// Create a new builder for `ArchiveConfig`.
    pub fn builder() -> ArchiveConfigBuilder {
        ArchiveConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ArchiveConfig`].
#[derive(Debug)]
pub struct ArchiveConfigBuilder {
    config: ArchiveConfig,
}

impl ArchiveConfigBuilder {
    pub fn scale_factor(mut self, scale: f32) -> Self {
        self.config.scale_factor = scale;
        self
    }

    pub fn reset_interval(mut self, pages: u32) -> Self {
        self.config.reset_interval = pages.max(1);
        self
    }

    pub fn navigation_wait(mut self, wait: Duration) -> Self {
        self.config.navigation_wait = wait;
        self
    }

    pub fn surface_ready_wait(mut self, wait: Duration) -> Self {
        self.config.surface_ready_wait = wait;
        self
    }

    pub fn reload_settle_wait(mut self, wait: Duration) -> Self {
        self.config.reload_settle_wait = wait;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backup_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn canvas(mut self, canvas: PageCanvas) -> Self {
        self.config.canvas = canvas;
        self
    }

    pub fn advance_failure(mut self, policy: AdvanceFailurePolicy) -> Self {
        self.config.advance_failure = policy;
        self
    }

    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.max_pages = Some(pages);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn writer(mut self, writer: Arc<dyn DocumentWriter>) -> Self {
        self.config.writer = Some(writer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ArchiveConfig, ArchiveError> {
        let c = &self.config;
        if !(c.scale_factor > 0.0 && c.scale_factor <= 8.0) {
            return Err(ArchiveError::InvalidConfig(format!(
                "Scale factor must be in (0, 8], got {}",
                c.scale_factor
            )));
        }
        if c.reset_interval == 0 {
            return Err(ArchiveError::InvalidConfig(
                "Reset interval must be ≥ 1".into(),
            ));
        }
        if c.max_pages == Some(0) {
            return Err(ArchiveError::InvalidConfig(
                "Max pages must be ≥ 1 when set".into(),
            ));
        }
        if !(c.canvas.width > 0.0 && c.canvas.height > 0.0) {
            return Err(ArchiveError::InvalidConfig(format!(
                "Page canvas must be positive, got {}x{}",
                c.canvas.width, c.canvas.height
            )));
        }
        Ok(self.config)
    }
}

// ── Enums and value types ────────────────────────────────────────────────

/// Interpretation of a failed advance instruction.
///
/// The viewer does not reliably distinguish "no further page" from a
/// transient fault when its advance control misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdvanceFailurePolicy {
    /// Treat the failure as a capture error: retry the advance once, abort
    /// the item when the retry fails too. (default)
    #[default]
    Retry,
    /// Treat the failure as the end of the item.
    EndOfItem,
}

/// Output page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageCanvas {
    pub width: f32,
    pub height: f32,
}

impl PageCanvas {
    /// ISO A4 portrait.
    pub const A4: PageCanvas = PageCanvas {
        width: 595.28,
        height: 841.89,
    };

    /// US Letter portrait.
    pub const LETTER: PageCanvas = PageCanvas {
        width: 612.0,
        height: 792.0,
    };
}

impl Default for PageCanvas {
    fn default() -> Self {
        PageCanvas::A4
    }
}

/// Account identifier and secret consumed by the login step.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Environment variable holding the account identifier.
    pub const USER_VAR: &'static str = "FOLIO_USER";
    /// Environment variable holding the secret.
    pub const PASS_VAR: &'static str = "FOLIO_PASS";

    /// Validate both values are present and non-blank.
    pub fn from_values(
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ArchiveError> {
        let username = username
            .filter(|u| !u.trim().is_empty())
            .ok_or(ArchiveError::MissingCredential {
                name: Self::USER_VAR,
            })?;
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(ArchiveError::MissingCredential {
                name: Self::PASS_VAR,
            })?;
        Ok(Self { username, password })
    }

    /// Read both values from the process environment.
    pub fn from_env() -> Result<Self, ArchiveError> {
        Self::from_values(
            std::env::var(Self::USER_VAR).ok(),
            std::env::var(Self::PASS_VAR).ok(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
