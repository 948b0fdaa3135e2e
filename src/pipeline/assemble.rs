//! Document assembly: staged page images → one paginated PDF.
//!
//! Assembly runs in two steps. [`plan_document`] reads the staging store in
//! ascending page order, decodes every artifact and computes where it sits
//! on the output canvas; unreadable artifacts become [`AssemblyWarning`]s and
//! are left out. A [`DocumentWriter`] then renders the plan. The default
//! writer, [`PdfiumWriter`], embeds each image with pdfium on the blocking
//! pool because pdfium calls must not run on an async worker.
//!
//! Every image is scaled by `min(canvasW / imageW, canvasH / imageH)` and
//! centred, so nothing is cropped or distorted whatever the source size.

use crate::config::{ArchiveConfig, PageCanvas};
use crate::error::{ArchiveError, AssemblyWarning};
use crate::pipeline::staging::StagingStore;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an image is drawn on its output page, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fit an `image_w` by `image_h` image inside `canvas`, preserving aspect
/// ratio and centring it.
pub fn fit_centered(image_w: u32, image_h: u32, canvas: PageCanvas) -> Placement {
    let iw = image_w.max(1) as f32;
    let ih = image_h.max(1) as f32;
    let scale = (canvas.width / iw).min(canvas.height / ih);
    let width = iw * scale;
    let height = ih * scale;
    Placement {
        x: (canvas.width - width) / 2.0,
        y: (canvas.height - height) / 2.0,
        width,
        height,
    }
}

/// One output page referencing one staged artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPage {
    pub page_index: u32,
    pub source: PathBuf,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub placement: Placement,
}

/// The assembled document, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub canvas: PageCanvas,
    pub pages: Vec<OutputPage>,
}

impl OutputDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Build the page plan from the staging store's current contents.
///
/// Artifacts that fail to decode are skipped with a warning; they never
/// abort assembly.
pub async fn plan_document(
    store: &StagingStore,
    canvas: PageCanvas,
) -> Result<(OutputDocument, Vec<AssemblyWarning>), ArchiveError> {
    let artifacts = store
        .list_ordered()
        .await
        .map_err(|e| ArchiveError::StagingFailed {
            path: store.dir().to_path_buf(),
            source: e,
        })?;

    tokio::task::spawn_blocking(move || {
        let mut pages = Vec::with_capacity(artifacts.len());
        let mut warnings = Vec::new();

        for artifact in artifacts {
            match image::open(&artifact.path) {
                Ok(img) => {
                    let placement = fit_centered(img.width(), img.height(), canvas);
                    debug!(
                        "Page {}: {}x{} px → {:.1}x{:.1} pt at ({:.1}, {:.1})",
                        artifact.page,
                        img.width(),
                        img.height(),
                        placement.width,
                        placement.height,
                        placement.x,
                        placement.y
                    );
                    pages.push(OutputPage {
                        page_index: artifact.page,
                        source: artifact.path,
                        pixel_width: img.width(),
                        pixel_height: img.height(),
                        placement,
                    });
                }
                Err(e) => {
                    let warning = AssemblyWarning {
                        page: artifact.page,
                        detail: e.to_string(),
                    };
                    warn!("⚠️  {}", warning);
                    warnings.push(warning);
                }
            }
        }

        (OutputDocument { canvas, pages }, warnings)
    })
    .await
    .map_err(|e| ArchiveError::Internal(format!("Assembly task panicked: {e}")))
}

/// Renders an [`OutputDocument`] to a file.
///
/// Called on the blocking pool.
pub trait DocumentWriter: Send + Sync {
    /// File extension of the produced document, without the dot.
    fn extension(&self) -> &'static str {
        "pdf"
    }

    /// Write `doc` to `path`, replacing any existing file.
    fn write(&self, doc: &OutputDocument, path: &Path) -> Result<(), ArchiveError>;
}

/// Writes PDF documents through pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumWriter {
    lib_path: Option<PathBuf>,
}

impl PdfiumWriter {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

impl DocumentWriter for PdfiumWriter {
    fn write(&self, doc: &OutputDocument, path: &Path) -> Result<(), ArchiveError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let fail = |detail: String| ArchiveError::AssemblyFailed {
            path: path.to_path_buf(),
            detail,
        };

        let mut document = pdfium
            .create_new_pdf()
            .map_err(|e| fail(format!("{e:?}")))?;
        let size = PdfPagePaperSize::Custom(
            PdfPoints::new(doc.canvas.width),
            PdfPoints::new(doc.canvas.height),
        );

        for page in &doc.pages {
            let image = image::open(&page.source)
                .map_err(|e| fail(format!("page {}: {e}", page.page_index)))?;
            let mut pdf_page = document
                .pages_mut()
                .create_page_at_end(size)
                .map_err(|e| fail(format!("page {}: {e:?}", page.page_index)))?;
            let p = page.placement;
            pdf_page
                .objects_mut()
                .create_image_object(
                    PdfPoints::new(p.x),
                    PdfPoints::new(p.y),
                    &image,
                    Some(PdfPoints::new(p.width)),
                    Some(PdfPoints::new(p.height)),
                )
                .map_err(|e| fail(format!("page {}: {e:?}", page.page_index)))?;
        }

        document
            .save_to_file(path)
            .map_err(|e| fail(format!("{e:?}")))
    }
}

/// Bind to a pdfium library.
///
/// Resolution order: the explicit `lib_path` (a library file or the
/// directory holding it), the working directory, then the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ArchiveError> {
    let bindings = match lib_path {
        Some(p) => {
            let file = if p.is_dir() {
                p.join(Pdfium::pdfium_platform_library_name())
            } else {
                p.to_path_buf()
            };
            Pdfium::bind_to_library(&file)
                .map_err(|e| ArchiveError::PdfiumBindingFailed(format!("{}: {e:?}", file.display())))?
        }
        None => {
            let local = PathBuf::from(".").join(Pdfium::pdfium_platform_library_name());
            Pdfium::bind_to_library(&local)
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| ArchiveError::PdfiumBindingFailed(format!("{e:?}")))?
        }
    };
    Ok(Pdfium::new(bindings))
}

/// Write `doc` into `output_dir` as `<name>.<ext>`.
///
/// The file is written to a temporary sibling first and renamed into place.
pub async fn write_document(
    writer: Arc<dyn DocumentWriter>,
    doc: &OutputDocument,
    output_dir: &Path,
    name: &str,
) -> Result<PathBuf, ArchiveError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| ArchiveError::OutputWriteFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let ext = writer.extension();
    let path = output_dir.join(format!("{name}.{ext}"));
    let tmp_path = output_dir.join(format!("{name}.{ext}.tmp"));

    let doc = doc.clone();
    let tmp = tmp_path.clone();
    let written = match tokio::task::spawn_blocking(move || writer.write(&doc, &tmp)).await {
        Ok(result) => result,
        Err(e) => Err(ArchiveError::Internal(format!("Document writer panicked: {e}"))),
    };
    if let Err(e) = written {
        match tokio::fs::remove_file(&tmp_path).await {
            Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                warn!("Could not remove {}: {}", tmp_path.display(), rm)
            }
            _ => {}
        }
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| ArchiveError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("Document written: {}", path.display());
    Ok(path)
}

/// Pick the configured writer, falling back to pdfium.
pub fn resolve_writer(config: &ArchiveConfig) -> Arc<dyn DocumentWriter> {
    match config.writer {
        Some(ref w) => Arc::clone(w),
        None => Arc::new(PdfiumWriter::new(config.pdfium_lib_path.clone())),
    }
}
