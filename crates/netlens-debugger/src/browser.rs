//! Inspector browser launch
//!
//! Points a Chromium-based browser at the bundled DevTools inspector. The
//! launch is best effort: any failure here leaves the debugger running so a
//! front-end can still attach by hand.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::SinkExt;
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use netlens_core::config::Config;
use netlens_core::error::{NetlensError, Result};

/// Total budget for the remote-debugging endpoint to come up.
const PROBE_BUDGET: Duration = Duration::from_secs(30);
/// Interval between `/json` probes.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// One entry of the remote-debugging `/json` tab list.
#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Query the remote-debugging endpoint for its open tabs.
pub async fn query_tabs(remote_debugger_port: u16) -> Result<Vec<TabInfo>> {
    let url = format!("http://127.0.0.1:{remote_debugger_port}/json");
    let response = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map_err(|e| NetlensError::BrowserLaunch(format!("probe failed: {e}")))?;
    response
        .json()
        .await
        .map_err(|e| NetlensError::BrowserLaunch(format!("bad tab list: {e}")))
}

/// Open the DevTools inspector pointed at this debugger.
///
/// Returns the browser child when this process launched (and therefore owns)
/// it.
pub async fn open_inspector(config: &Config) -> Result<Option<Child>> {
    let target = config.inspector_url();

    // A leftover inspector tab from a previous run would shadow the new one.
    close_stale_tab(config.remote_debugger_port, &target).await;

    if cfg!(target_os = "macos") {
        // The macOS launcher applies the remote-debugging flag itself.
        launch_darwin(&target)?;
        info!(url = %target, "inspector launched");
        return Ok(None);
    }

    let child = launch_with_flags(&target, config.remote_debugger_port)?;

    // The freshly launched browser needs a moment before /json answers.
    let deadline = tokio::time::Instant::now() + PROBE_BUDGET;
    loop {
        match query_tabs(config.remote_debugger_port).await {
            Ok(tabs) => {
                let Some(ws_url) = tabs
                    .first()
                    .and_then(|tab| tab.web_socket_debugger_url.clone())
                else {
                    return Err(NetlensError::BrowserLaunch("no tabs exposed".to_string()));
                };
                send_command(&ws_url, "Page.navigate", json!({"url": target})).await?;
                info!(url = %target, "inspector launched");
                return Ok(Some(child));
            }
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(PROBE_INTERVAL).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Close an existing tab whose url equals the target inspector url.
async fn close_stale_tab(remote_debugger_port: u16, target: &str) {
    let Ok(tabs) = query_tabs(remote_debugger_port).await else {
        return;
    };
    for tab in tabs {
        if tab.url.as_deref() == Some(target) {
            if let Some(ws_url) = tab.web_socket_debugger_url {
                debug!(id = tab.id.as_deref().unwrap_or("-"), "closing stale inspector tab");
                if let Err(err) = send_command(&ws_url, "Page.close", json!({})).await {
                    debug!(error = %err, "stale tab close failed");
                }
            }
        }
    }
}

/// Fire one CDP command at a tab endpoint without waiting for the result.
async fn send_command(ws_url: &str, method: &str, params: serde_json::Value) -> Result<()> {
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| NetlensError::BrowserLaunch(format!("tab connect failed: {e}")))?;
    let command = json!({"id": 1, "method": method, "params": params});
    ws.send(Message::Text(command.to_string()))
        .await
        .map_err(|e| NetlensError::BrowserLaunch(format!("tab command failed: {e}")))?;
    let _ = ws.close(None).await;
    Ok(())
}

fn launch_darwin(url: &str) -> Result<()> {
    Command::new("open")
        .arg("-a")
        .arg("Google Chrome")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| NetlensError::BrowserLaunch(format!("open failed: {e}")))?;
    Ok(())
}

fn launch_with_flags(url: &str, remote_debugger_port: u16) -> Result<Child> {
    let binary = find_browser().ok_or_else(|| {
        NetlensError::BrowserLaunch("no chromium-based browser found".to_string())
    })?;
    Command::new(&binary)
        .arg(format!("--remote-debugging-port={remote_debugger_port}"))
        .arg("--no-first-run")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            warn!(binary = %binary, error = %e, "browser spawn failed");
            NetlensError::BrowserLaunch(format!("spawn failed: {e}"))
        })
}

/// Locate a Chromium-based browser binary.
fn find_browser() -> Option<String> {
    const CANDIDATES: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/usr/bin/microsoft-edge",
    ];
    for candidate in CANDIDATES {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
    }
    // Fall back to PATH resolution.
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if Command::new("which")
            .arg(name)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            return Some(name.to_string());
        }
    }
    None
}
