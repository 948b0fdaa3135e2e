//! The web book reader, driven over DevTools.
//!
//! [`ViewerSession`] implements [`RenderingSession`] and [`Catalog`] for a
//! canvas-based reader: a page-number input, a "next" button and one
//! `<canvas>` per displayed page. Every site-specific detail (URLs, element
//! locators, the cover marker) lives in a [`ViewerProfile`], loadable from
//! JSON so a changed site layout needs no rebuild.
//!
//! Locators use the reader's own notation: `xpath=<expr>` for XPath,
//! anything else is a CSS selector. Templates for catalog entries contain
//! `{index}`, replaced with the 1-based entry position.

use crate::config::{ArchiveConfig, Credentials};
use crate::error::ArchiveError;
use crate::session::cdp::CdpClient;
use crate::session::{
    AdvanceOutcome, Catalog, Item, ItemHandle, PageMarker, RenderingSession, SessionError, Surface,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Consecutive identical canvas samples required before a page counts as
/// rendered.
const STABLE_SAMPLES: u32 = 3;

// ── Profile ──────────────────────────────────────────────────────────────

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Site description for one reader deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerProfile {
    pub login_url: String,
    pub library_url: String,
    pub login_username: String,
    pub login_password: String,
    /// "Remember me" control; clicked when present in the profile.
    pub login_remember: Option<String>,
    pub login_submit: String,
    /// Matches every catalog entry.
    pub catalog_entries: String,
    pub catalog_title: String,
    pub catalog_open: String,
    /// Switches a two-page spread to single-page view when it exists.
    pub single_page_toggle: Option<String>,
    pub page_input: String,
    pub next_button: String,
    pub canvas: String,
    pub first_page_marker: String,
    pub viewport: Viewport,
}

const CATALOG_ROOT: &str =
    r#"//*[@id="content"]/div/div/div/div/div[1]/div/div[2]/div[2]/div/div/div/div/div"#;
const LOGIN_FORM: &str =
    r#"//*[@id="content"]/div/div/div/div/div[1]/div/div[3]/div/div[1]/div[2]/div/div[1]/div[1]"#;

impl Default for ViewerProfile {
    fn default() -> Self {
        Self {
            login_url: "https://mazonecec.com/application/login".into(),
            library_url: "https://mazonecec.com/application/mylibrary".into(),
            login_username: format!("xpath={LOGIN_FORM}/div[1]/input"),
            login_password: format!("xpath={LOGIN_FORM}/div[2]/input"),
            login_remember: Some(format!("xpath={LOGIN_FORM}/button[1]")),
            login_submit: format!("xpath={LOGIN_FORM}/button[2]"),
            catalog_entries: format!("xpath={CATALOG_ROOT}/div[2]/div[2]/div"),
            catalog_title: format!(
                "xpath={CATALOG_ROOT}/div[2]/div[2]/div[{{index}}]/div/div/div[1]/div[2]/div/div/div/button/span"
            ),
            catalog_open: format!(
                "xpath={CATALOG_ROOT}/div[2]/div[2]/div[{{index}}]/div/div/div[2]/div/div[2]/div/div[1]/div[1]/div/div[1]/button/img"
            ),
            single_page_toggle: Some(format!(
                "xpath={CATALOG_ROOT}/div[1]/div/div/div[1]/div[2]/div[2]/div[1]/div/button/div"
            )),
            page_input: "xpath=/html/body/div/div/div/div/div/div[1]/div/div[1]/div[2]/div/div/div[3]/div[1]/input".into(),
            next_button: r#"xpath=//*[@id="DocumentContainer"]/div/div[3]/div[2]/div/button"#.into(),
            canvas: ".canvasWrapper > canvas:nth-child(1)".into(),
            first_page_marker: "C1".into(),
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
        }
    }
}

impl ViewerProfile {
    /// Read a profile from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let invalid = |detail: String| ArchiveError::InvalidProfile {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))
    }

    /// Substitute a 1-based catalog position into an entry template.
    pub fn entry_locator(template: &str, index: usize) -> String {
        template.replace("{index}", &index.to_string())
    }
}

// ── Script builders ──────────────────────────────────────────────────────

/// JS expression resolving `locator` to an element or `null`.
fn find_js(locator: &str) -> String {
    let loc = js_string(locator);
    format!(
        "(function(){{const l={loc};\
         if(l.startsWith('xpath='))return document.evaluate(l.slice(6),document,null,\
         XPathResult.FIRST_ORDERED_NODE_TYPE,null).singleNodeValue;\
         return document.querySelector(l);}})()"
    )
}

/// JS expression for the page canvas: `locator`, else the first canvas in
/// the document. Readiness and read-back must agree on which canvas it is.
fn canvas_js(locator: &str) -> String {
    format!("({}||document.getElementsByTagName('canvas')[0])", find_js(locator))
}

/// JS expression counting elements matched by `locator`.
fn count_js(locator: &str) -> String {
    let loc = js_string(locator);
    format!(
        "(function(){{const l={loc};\
         if(l.startsWith('xpath='))return document.evaluate(l.slice(6),document,null,\
         XPathResult.ORDERED_NODE_SNAPSHOT_TYPE,null).snapshotLength;\
         return document.querySelectorAll(l).length;}})()"
    )
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Split a `data:image/png;base64,...` URL into raw bytes.
fn decode_data_url(url: &str) -> Result<Vec<u8>, SessionError> {
    let (_, payload) = url
        .split_once(";base64,")
        .ok_or_else(|| SessionError::Script("canvas returned a non-base64 data URL".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| SessionError::Script(format!("canvas data URL: {e}")))
}

// ── Session ──────────────────────────────────────────────────────────────

/// A live reader tab.
#[derive(Debug)]
pub struct ViewerSession {
    client: CdpClient,
    profile: ViewerProfile,
    navigation_wait: Duration,
}

impl ViewerSession {
    /// Wrap a connected page and apply the profile's viewport.
    pub async fn new(
        client: CdpClient,
        profile: ViewerProfile,
        config: &ArchiveConfig,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            client,
            profile,
            navigation_wait: config.navigation_wait,
        };
        session.client.call("Page.enable", json!({})).await?;
        let vp = session.profile.viewport;
        session
            .client
            .call(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": vp.width,
                    "height": vp.height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;
        Ok(session)
    }

    pub fn profile(&self) -> &ViewerProfile {
        &self.profile
    }

    /// Sign in. A single attempt; the caller treats failure as fatal.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        let login_url = self.profile.login_url.clone();
        self.navigate(&login_url).await?;

        let username = self.profile.login_username.clone();
        let password = self.profile.login_password.clone();
        let submit = self.profile.login_submit.clone();
        self.fill(&username, &credentials.username).await?;
        self.fill(&password, &credentials.password).await?;
        if let Some(remember) = self.profile.login_remember.clone() {
            self.click(&remember).await?;
        }

        let before = self.location().await?;
        self.click(&submit).await?;
        self.wait_for_url_change(&before).await?;
        info!("Logged in as {}", credentials.username);
        Ok(())
    }

    // ── Primitives ───────────────────────────────────────────────────────

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to {}", url);
        let result = self.client.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = result.get("errorText").and_then(Value::as_str) {
            return Err(SessionError::Command {
                method: "Page.navigate".into(),
                message: format!("{url}: {err}"),
            });
        }
        self.wait_for_load().await
    }

    async fn wait_for_load(&mut self) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + LOAD_TIMEOUT;
        loop {
            let state = self.client.evaluate("document.readyState").await;
            if matches!(state, Ok(Value::String(ref s)) if s == "complete") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: "page load".into(),
                    secs: LOAD_TIMEOUT.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn location(&mut self) -> Result<String, SessionError> {
        Ok(self
            .client
            .evaluate("location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn wait_for_url_change(&mut self, from: &str) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + LOAD_TIMEOUT;
        loop {
            if self.location().await? != from {
                return self.wait_for_load().await;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: format!("navigation away from {from}"),
                    secs: LOAD_TIMEOUT.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, locator: &str) -> Result<(), SessionError> {
        let script = format!(
            "(function(){{const el={};if(!el)return false;\
             el.scrollIntoView({{block:'center'}});el.click();return true;}})()",
            find_js(locator)
        );
        match self.client.evaluate(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(SessionError::ElementNotFound(locator.to_string())),
        }
    }

    /// Replace the contents of an input with `value`, as typed text.
    async fn fill(&mut self, locator: &str, value: &str) -> Result<(), SessionError> {
        let script = format!(
            "(function(){{const el={};if(!el)return false;el.focus();\
             if(typeof el.select==='function')el.select();\
             el.value='';el.dispatchEvent(new Event('input',{{bubbles:true}}));return true;}})()",
            find_js(locator)
        );
        if self.client.evaluate(&script).await? != Value::Bool(true) {
            return Err(SessionError::ElementNotFound(locator.to_string()));
        }
        self.client
            .call("Input.insertText", json!({ "text": value }))
            .await?;
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<(), SessionError> {
        for kind in ["keyDown", "keyUp"] {
            self.client
                .call(
                    "Input.dispatchKeyEvent",
                    json!({
                        "type": kind,
                        "key": "Enter",
                        "code": "Enter",
                        "windowsVirtualKeyCode": 13,
                        "text": if kind == "keyDown" { "\r" } else { "" },
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn input_value(&mut self, locator: &str) -> Result<String, SessionError> {
        let script = format!(
            "(function(){{const el={};return el?String(el.value):null;}})()",
            find_js(locator)
        );
        match self.client.evaluate(&script).await? {
            Value::String(s) => Ok(s),
            _ => Err(SessionError::ElementNotFound(locator.to_string())),
        }
    }

    async fn count(&mut self, locator: &str) -> Result<usize, SessionError> {
        let n = self.client.evaluate(&count_js(locator)).await?;
        Ok(n.as_u64().unwrap_or(0) as usize)
    }

    async fn inner_text(&mut self, locator: &str) -> Result<Option<String>, SessionError> {
        let script = format!(
            "(function(){{const el={};return el?el.innerText:null;}})()",
            find_js(locator)
        );
        Ok(self
            .client
            .evaluate(&script)
            .await?
            .as_str()
            .map(|s| s.trim().to_string()))
    }

    /// Small fingerprint of the canvas: size plus a 16x16 downsample sum.
    /// `null` while no canvas exists or it has zero size.
    async fn canvas_signature(&mut self) -> Result<Option<String>, SessionError> {
        let script = format!(
            "(function(){{const c={};if(!c||!c.width||!c.height)return null;\
             const s=document.createElement('canvas');s.width=16;s.height=16;\
             const x=s.getContext('2d');x.drawImage(c,0,0,16,16);\
             const d=x.getImageData(0,0,16,16).data;let h=0;\
             for(let i=0;i<d.length;i++)h=(h*31+d[i])>>>0;\
             return c.width+'x'+c.height+':'+h;}})()",
            canvas_js(&self.profile.canvas)
        );
        Ok(self.client.evaluate(&script).await?.as_str().map(str::to_string))
    }

    async fn history_back(&mut self) -> Result<(), SessionError> {
        let history = self
            .client
            .call("Page.getNavigationHistory", json!({}))
            .await?;
        let current = history
            .get("currentIndex")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let previous = current
            .checked_sub(1)
            .and_then(|i| history.get("entries")?.get(i)?.get("id")?.as_u64())
            .ok_or_else(|| SessionError::Script("no previous history entry".into()))?;
        self.client
            .call("Page.navigateToHistoryEntry", json!({ "entryId": previous }))
            .await?;
        self.wait_for_load().await
    }
}

impl RenderingSession for ViewerSession {
    async fn open(&mut self, item: &Item) -> Result<(), SessionError> {
        let open = ViewerProfile::entry_locator(&self.profile.catalog_open, item.handle.0);
        let before = self.location().await?;
        self.click(&open).await?;
        self.wait_for_url_change(&before).await?;
        tokio::time::sleep(self.navigation_wait).await;

        if let Some(toggle) = self.profile.single_page_toggle.clone() {
            match self.count(&toggle).await {
                Ok(n) if n > 0 => match self.click(&toggle).await {
                    Ok(()) => {
                        debug!("Switched \"{}\" to single-page view", item.display_name);
                        tokio::time::sleep(self.navigation_wait).await;
                    }
                    Err(e) => debug!("Single-page toggle ignored: {}", e),
                },
                Ok(_) => {}
                Err(e) => debug!("Single-page toggle lookup ignored: {}", e),
            }
        }
        info!("Opened \"{}\"", item.display_name);
        Ok(())
    }

    fn first_page_marker(&self) -> PageMarker {
        PageMarker::new(self.profile.first_page_marker.clone())
    }

    async fn navigate_to_marker(&mut self, marker: &PageMarker) -> Result<(), SessionError> {
        let input = self.profile.page_input.clone();
        self.fill(&input, marker.as_str()).await?;
        self.press_enter().await?;
        tokio::time::sleep(self.navigation_wait).await;
        Ok(())
    }

    async fn current_marker(&mut self) -> Result<PageMarker, SessionError> {
        let input = self.profile.page_input.clone();
        self.input_value(&input).await.map(PageMarker::new)
    }

    async fn wait_until_ready(&mut self) -> Result<(), SessionError> {
        let mut last: Option<String> = None;
        let mut stable = 0;
        loop {
            match self.canvas_signature().await? {
                Some(sig) => {
                    if last.as_deref() == Some(sig.as_str()) {
                        stable += 1;
                    } else {
                        stable = 1;
                        last = Some(sig);
                    }
                    if stable >= STABLE_SAMPLES {
                        return Ok(());
                    }
                }
                None => {
                    stable = 0;
                    last = None;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_surface(&mut self) -> Result<Option<Surface>, SessionError> {
        let script = format!(
            "(function(){{const c={};\
             if(!c||!c.width||!c.height)return null;\
             return {{w:c.width,h:c.height,data:c.toDataURL('image/png')}};}})()",
            canvas_js(&self.profile.canvas)
        );
        let value = self.client.evaluate(&script).await?;
        if value.is_null() {
            return Ok(None);
        }
        let dim = |k: &str| value.get(k).and_then(Value::as_u64).unwrap_or(0) as u32;
        let data = value
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Script("canvas read-back returned no data".into()))?;
        Ok(Some(Surface {
            width: dim("w"),
            height: dim("h"),
            encoded: decode_data_url(data)?,
        }))
    }

    async fn advance(&mut self) -> AdvanceOutcome {
        let before = self.current_marker().await.ok();
        let script = format!(
            "(function(){{const el={};if(!el)return 'missing';\
             if(el.disabled||el.getAttribute('aria-disabled')==='true')return 'disabled';\
             el.click();return 'clicked';}})()",
            find_js(&self.profile.next_button)
        );
        let clicked = match self.client.evaluate(&script).await {
            Ok(Value::String(s)) => s,
            Ok(other) => return AdvanceOutcome::Failed(format!("unexpected result {other}")),
            Err(e) => return AdvanceOutcome::Failed(e.to_string()),
        };
        match clicked.as_str() {
            "disabled" => return AdvanceOutcome::Exhausted,
            "missing" => {
                return AdvanceOutcome::Failed(format!(
                    "next button not found: {}",
                    self.profile.next_button
                ))
            }
            _ => {}
        }
        tokio::time::sleep(self.navigation_wait).await;

        // A click that leaves the page number unchanged means the last page.
        match (before, self.current_marker().await.ok()) {
            (Some(a), Some(b)) if a == b => AdvanceOutcome::Exhausted,
            _ => AdvanceOutcome::Advanced,
        }
    }

    async fn reset(&mut self) -> Result<(), SessionError> {
        self.client.call("Page.reload", json!({})).await?;
        self.wait_for_load().await
    }
}

impl Catalog for ViewerSession {
    async fn list_items(&mut self) -> Result<Vec<Item>, SessionError> {
        tokio::time::sleep(self.navigation_wait).await;
        let entries = self.profile.catalog_entries.clone();
        let count = self.count(&entries).await?;

        let mut items = Vec::with_capacity(count);
        for index in 1..=count {
            let title = ViewerProfile::entry_locator(&self.profile.catalog_title, index);
            match self.inner_text(&title).await {
                Ok(Some(t)) if !t.is_empty() => items.push(Item::new(ItemHandle(index), t)),
                Ok(_) => debug!("Catalog entry {} has no readable title", index),
                Err(e) => debug!("Catalog entry {} skipped: {}", index, e),
            }
        }
        Ok(items)
    }

    async fn return_to_catalog(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.history_back().await {
            warn!("History back failed ({}); opening the library directly", e);
            let library = self.profile.library_url.clone();
            self.navigate(&library).await?;
        }
        tokio::time::sleep(self.navigation_wait).await;
        Ok(())
    }
}
