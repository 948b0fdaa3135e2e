//! Minimal Chrome DevTools Protocol client.
//!
//! Two layers:
//!
//! - [`Browser`] starts (or attaches to) a Chromium instance and discovers a
//!   page target through the DevTools HTTP endpoint (`/json/list`).
//! - [`CdpClient`] speaks JSON-RPC over the target's WebSocket: every
//!   command carries an id, and [`CdpClient::call`] reads frames until the
//!   matching response arrives. Events received in between are dropped; the
//!   viewer polls page state instead of subscribing.

use crate::session::SessionError;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Default DevTools port.
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Upper bound on a single command round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Executable names searched on `PATH` when none is given.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

#[cfg(target_os = "macos")]
const CHROME_BUNDLE_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(target_os = "macos"))]
const CHROME_BUNDLE_PATHS: &[&str] = &[];

// ── Browser process ──────────────────────────────────────────────────────

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Browser executable; searched on `PATH` when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub port: u16,
    /// Window size in CSS pixels.
    pub window: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            port: DEFAULT_DEBUG_PORT,
            window: (1920, 1080),
        }
    }
}

/// A running (or attached) browser exposing a DevTools endpoint.
///
/// A launched browser is killed when this value is dropped.
pub struct Browser {
    child: Option<Child>,
    _profile_dir: Option<tempfile::TempDir>,
    http_endpoint: String,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("launched", &self.child.is_some())
            .field("http_endpoint", &self.http_endpoint)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    ws_url: Option<String>,
}

impl Browser {
    /// Start a browser with a throwaway profile and remote debugging on.
    pub async fn launch(opts: &LaunchOptions) -> Result<Self, SessionError> {
        let exe = match opts.executable {
            Some(ref p) => p.clone(),
            None => find_browser_executable().ok_or_else(|| {
                SessionError::Endpoint(
                    "no Chrome/Chromium executable found on PATH; pass --chrome".to_string(),
                )
            })?,
        };
        let profile = tempfile::Builder::new()
            .prefix("folio-profile-")
            .tempdir()
            .map_err(|e| SessionError::Endpoint(format!("profile directory: {e}")))?;

        let mut cmd = Command::new(&exe);
        cmd.arg(format!("--remote-debugging-port={}", opts.port))
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!("--window-size={},{}", opts.window.0, opts.window.1))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding");
        if opts.headless {
            cmd.arg("--headless=new");
        }
        cmd.arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SessionError::Endpoint(format!("{}: {e}", exe.display())))?;
        info!(
            "Launched {} (DevTools port {}, headless: {})",
            exe.display(),
            opts.port,
            opts.headless
        );

        Ok(Self {
            child: Some(child),
            _profile_dir: Some(profile),
            http_endpoint: format!("http://127.0.0.1:{}", opts.port),
        })
    }

    /// Use an already running browser at `http_endpoint`
    /// (e.g. `http://127.0.0.1:9222`).
    pub fn attach(http_endpoint: impl Into<String>) -> Self {
        let http_endpoint = http_endpoint.into().trim_end_matches('/').to_string();
        info!("Attaching to browser at {}", http_endpoint);
        Self {
            child: None,
            _profile_dir: None,
            http_endpoint,
        }
    }

    pub fn http_endpoint(&self) -> &str {
        &self.http_endpoint
    }

    /// Connect to the first page target, waiting for the endpoint to come up.
    pub async fn connect_page(&self) -> Result<CdpClient, SessionError> {
        let url = self.page_websocket_url().await?;
        CdpClient::connect(&url).await
    }

    async fn page_websocket_url(&self) -> Result<String, SessionError> {
        let list_url = format!("{}/json/list", self.http_endpoint);
        let mut last_err = String::new();

        for attempt in 1..=40u32 {
            match fetch_targets(&list_url).await {
                Ok(targets) => {
                    if let Some(url) = first_page_target(&targets) {
                        debug!("Page target after {} attempt(s): {}", attempt, url);
                        return Ok(url);
                    }
                    last_err = "no page target listed".to_string();
                }
                Err(e) => last_err = e,
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err(SessionError::Endpoint(format!("{list_url}: {last_err}")))
    }

    /// Terminate a launched browser. No-op when attached.
    pub async fn close(mut self) {
        if let Some(ref mut child) = self.child {
            if let Err(e) = child.kill().await {
                warn!("Could not stop browser: {}", e);
            }
        }
    }
}

async fn fetch_targets(url: &str) -> Result<Vec<TargetInfo>, String> {
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    response
        .json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| e.to_string())
}

fn first_page_target(targets: &[TargetInfo]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.ws_url.clone())
}

/// Locate a Chromium-family browser on this machine.
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            for name in CHROME_CANDIDATES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
                let exe = candidate.with_extension("exe");
                if exe.is_file() {
                    return Some(exe);
                }
            }
        }
    }
    CHROME_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

// ── Protocol client ──────────────────────────────────────────────────────

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-RPC client for one DevTools page target.
pub struct CdpClient {
    socket: Socket,
    next_id: u64,
}

impl std::fmt::Debug for CdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpClient")
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl CdpClient {
    pub async fn connect(ws_url: &str) -> Result<Self, SessionError> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| SessionError::Transport(format!("{ws_url}: {e}")))?;
        debug!("DevTools socket open: {}", ws_url);
        Ok(Self { socket, next_id: 1 })
    }

    /// Send `method` and wait for its result.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, SessionError> {
        let id = self.next_id;
        self.next_id += 1;

        let frame = json!({ "id": id, "method": method, "params": params });
        self.socket
            .send(Message::text(frame.to_string()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let response = tokio::time::timeout(COMMAND_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| SessionError::Timeout {
                what: format!("response to {method}"),
                secs: COMMAND_TIMEOUT.as_secs(),
            })??;

        if let Some(err) = response.get("error") {
            return Err(SessionError::Command {
                method: method.to_string(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn read_response(&mut self, id: u64) -> Result<Value, SessionError> {
        while let Some(frame) = self.socket.next().await {
            let frame = frame.map_err(|e| SessionError::Transport(e.to_string()))?;
            let text = match frame {
                Message::Text(ref t) => t.as_str(),
                Message::Close(_) => {
                    return Err(SessionError::Transport("socket closed by browser".into()))
                }
                _ => continue,
            };
            let value: Value = serde_json::from_str(text)
                .map_err(|e| SessionError::Transport(format!("malformed frame: {e}")))?;
            if value.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(value);
            }
        }
        Err(SessionError::Transport("socket ended".into()))
    }

    /// Evaluate `expression` in the page and return its JSON value.
    ///
    /// Promises are awaited. A thrown exception becomes
    /// [`SessionError::Script`].
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value, SessionError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(SessionError::Script(exception_message(details)));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

fn exception_message(details: &Value) -> String {
    details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .or_else(|| details.get("text").and_then(Value::as_str))
        .unwrap_or("uncaught exception")
        .to_string()
}
