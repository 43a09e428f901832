//! Debugger configuration
//!
//! Recognised options with their defaults, each overridable through one
//! environment variable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// DevTools front-end WebSocket port.
pub const DEFAULT_PORT: u16 = 5270;
/// Host ↔ debugger IPC port.
pub const DEFAULT_SERVER_PORT: u16 = 5271;
/// Chromium remote-debugging port used for browser launch.
pub const DEFAULT_REMOTE_DEBUGGER_PORT: u16 = 9333;
/// Body capture cap per record, request and response side alike.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Records retained while the IPC connection is down.
pub const DEFAULT_BUFFER_LIMIT: usize = 512;
/// Lock file guarding the single debugger process.
pub const LOCK_FILE_NAME: &str = "request-center.lock";

/// Configuration shared by the host library and the debugger process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Debugger ↔ browser WebSocket port.
    pub port: u16,
    /// Host ↔ debugger IPC port.
    pub server_port: u16,
    /// Chromium remote-debugging port.
    pub remote_debugger_port: u16,
    /// Suppress the automatic browser launch.
    pub dev_mode: bool,
    /// Per-record body capture cap, applied to the request body copy and the
    /// response tee alike; past it the copy is truncated, never the caller's
    /// payload or stream.
    pub max_body_bytes: usize,
    /// High-water mark for records buffered while the debugger is away.
    pub buffer_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            server_port: DEFAULT_SERVER_PORT,
            remote_debugger_port: DEFAULT_REMOTE_DEBUGGER_PORT,
            dev_mode: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        }
    }
}

impl Config {
    /// Defaults overlaid with the `NETWORK_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_u16("NETWORK_PORT") {
            config.port = port;
        }
        if let Some(port) = env_u16("NETWORK_SERVER_PORT") {
            config.server_port = port;
        }
        if let Some(port) = env_u16("REMOTE_DEBUGGER_PORT") {
            config.remote_debugger_port = port;
        }
        if std::env::var("NETWORK_DEBUG_MODE").as_deref() == Ok("true") {
            config.dev_mode = true;
        }
        config
    }

    /// Lock file path in the well-known temp directory.
    pub fn lock_path(&self) -> PathBuf {
        std::env::temp_dir().join(LOCK_FILE_NAME)
    }

    /// IPC endpoint the host connects to.
    pub fn ipc_addr(&self) -> String {
        format!("127.0.0.1:{}", self.server_port)
    }

    /// URL the inspector front-end is pointed at.
    pub fn inspector_url(&self) -> String {
        format!(
            "devtools://devtools/bundled/inspector.html?ws=localhost:{}",
            self.port
        )
    }
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok()?.parse().ok()
}
