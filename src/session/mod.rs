//! Collaborator interfaces: the catalog and the rendering session.
//!
//! The capture pipeline only ever talks to a viewer through
//! [`RenderingSession`] and [`Catalog`]. [`viewer::ViewerSession`] implements
//! both on top of a Chrome DevTools Protocol connection ([`cdp`]); tests
//! implement them with scripted in-memory fakes.
//!
//! ```text
//! Catalog ──list_items──▶ Item ──open──▶ RenderingSession
//!                                          │  navigate_to_marker / advance / reset
//!                                          ▼
//!                                        Surface (encoded raster)
//! ```

pub mod cdp;
pub mod viewer;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque reference to a catalog entry, resolvable only by the catalog
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemHandle(pub usize);

/// One selectable document in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub handle: ItemHandle,
    /// Human-readable title. Neither unique nor filesystem-safe.
    pub display_name: String,
}

impl Item {
    pub fn new(handle: ItemHandle, display_name: impl Into<String>) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
        }
    }
}

/// Viewer-specific page label, e.g. `"C1"` for a cover or `"17"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageMarker(pub String);

impl PageMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The raster currently shown by the viewer.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Encoded raster (PNG) at native resolution.
    pub encoded: Vec<u8>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded", &format_args!("<{} bytes>", self.encoded.len()))
            .finish()
    }
}

/// Result of asking the viewer to show the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The viewer moved to a further page.
    Advanced,
    /// The viewer reported that no further page exists.
    Exhausted,
    /// The instruction could not be carried out.
    Failed(String),
}

/// Errors raised by a session implementation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The DevTools connection broke or returned malformed data.
    #[error("DevTools transport error: {0}")]
    Transport(String),

    /// The browser rejected a protocol command.
    #[error("DevTools command '{method}' failed: {message}")]
    Command { method: String, message: String },

    /// No element matched the locator.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A page script threw.
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// A bounded wait expired.
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// The DevTools HTTP endpoint was unreachable or answered unexpectedly.
    #[error("DevTools endpoint error: {0}")]
    Endpoint(String),
}

/// The live, stateful view of an open item.
///
/// One session has exactly one page cursor. Callers drive it sequentially
/// through `&mut self`; implementations need no interior locking.
#[allow(async_fn_in_trait)]
pub trait RenderingSession {
    /// Open `item` in the viewer.
    async fn open(&mut self, item: &Item) -> Result<(), SessionError>;

    /// Marker of the designated first page (e.g. the cover).
    fn first_page_marker(&self) -> PageMarker;

    /// Jump to the page labelled `marker`.
    async fn navigate_to_marker(&mut self, marker: &PageMarker) -> Result<(), SessionError>;

    /// Marker of the page currently displayed.
    async fn current_marker(&mut self) -> Result<PageMarker, SessionError>;

    /// Resolve once the current page has finished rendering.
    ///
    /// May wait indefinitely; callers bound it with a timeout.
    async fn wait_until_ready(&mut self) -> Result<(), SessionError>;

    /// The current page's raster, or `None` when no surface exists.
    async fn current_surface(&mut self) -> Result<Option<Surface>, SessionError>;

    /// Show the next page.
    async fn advance(&mut self) -> AdvanceOutcome;

    /// Reload the viewer. The page cursor afterwards is unspecified.
    async fn reset(&mut self) -> Result<(), SessionError>;
}

/// The source of selectable items.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    /// Enumerate the catalog in display order.
    async fn list_items(&mut self) -> Result<Vec<Item>, SessionError>;

    /// Bring the viewer back to the catalog after an item.
    async fn return_to_catalog(&mut self) -> Result<(), SessionError>;
}
