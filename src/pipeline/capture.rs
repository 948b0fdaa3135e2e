//! Capture unit: rasterise the viewer's surface into a stored page image.
//!
//! The surface arrives as an encoded raster at native resolution. It is
//! decoded, resampled to `width * scale` by `height * scale` with a Lanczos
//! filter and re-encoded as PNG. Decoding and resampling are CPU-bound and
//! run on the blocking pool.

use crate::error::CaptureError;
use crate::session::Surface;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// One captured page, encoded and ready for staging.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Target dimensions for a `width` by `height` surface at `scale`.
///
/// Fractional pixels are truncated; neither edge collapses below 1 px.
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = (width as f64 * scale as f64).floor() as u32;
    let h = (height as f64 * scale as f64).floor() as u32;
    (w.max(1), h.max(1))
}

/// Produce the artifact for `page` from the surface read off the viewer.
///
/// # Errors
/// [`CaptureError::NoSurface`] when `surface` is `None`;
/// [`CaptureError::Encode`] when the raster cannot be decoded or re-encoded.
pub async fn capture_page(
    surface: Option<Surface>,
    page: u32,
    scale: f32,
) -> Result<PageImage, CaptureError> {
    let surface = surface.ok_or(CaptureError::NoSurface { page })?;

    tokio::task::spawn_blocking(move || upscale_blocking(&surface, page, scale))
        .await
        .map_err(|e| CaptureError::Encode {
            page,
            detail: format!("capture task panicked: {e}"),
        })?
}

/// Blocking implementation of [`capture_page`].
pub fn upscale_blocking(surface: &Surface, page: u32, scale: f32) -> Result<PageImage, CaptureError> {
    let decoded = image::load_from_memory(&surface.encoded).map_err(|e| CaptureError::Encode {
        page,
        detail: e.to_string(),
    })?;

    let (target_w, target_h) = scaled_dimensions(surface.width, surface.height, scale);
    let scaled = if decoded.width() == target_w && decoded.height() == target_h {
        decoded
    } else {
        decoded.resize_exact(target_w, target_h, FilterType::Lanczos3)
    };

    let png = encode_png(&scaled).map_err(|e| CaptureError::Encode {
        page,
        detail: e.to_string(),
    })?;
    debug!(
        "Page {}: {}x{} surface → {}x{} px, {} bytes",
        page,
        surface.width,
        surface.height,
        target_w,
        target_h,
        png.len()
    );

    Ok(PageImage {
        page,
        width: target_w,
        height: target_h,
        png,
    })
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
