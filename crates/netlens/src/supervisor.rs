//! Single-debugger supervision
//!
//! At most one debugger process serves a machine. The rendezvous is an
//! advisory file lock plus a loopback socket: whichever host acquires the
//! lock forks the debugger executable, everyone else connects to the
//! endpoint the lock owner announced. In-memory singletons do not cross
//! process boundaries, so the lock file is the only shared state.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use netlens_core::config::Config;
use netlens_core::error::{NetlensError, Result};
use netlens_core::record::now_unix_seconds;
use netlens_core::wire::{decode_line, WireMessage};

/// How long a connect attempt to an existing debugger may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to wait for a freshly forked debugger to come up.
const SPAWN_WAIT: Duration = Duration::from_secs(10);
/// Lock owners older than this that do not answer the probe are stale.
const STALE_AFTER_SECS: f64 = 60.0;

/// Payload stored in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub port: u16,
    pub started_at: f64,
}

/// An accepted host connection: the `ready` greeting has been consumed and
/// the stream is ready for `request_end` traffic.
pub struct DebuggerConnection {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

/// Ensures a single debugger process and hands out connections to it.
pub struct Supervisor {
    config: Config,
    lock_path: PathBuf,
    lock: Mutex<Option<File>>,
    debugger_bin: Option<PathBuf>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let lock_path = config.lock_path();
        Self {
            config,
            lock_path,
            lock: Mutex::new(None),
            debugger_bin: None,
        }
    }

    /// Override the lock file location (tests).
    pub fn with_lock_path(mut self, path: PathBuf) -> Self {
        self.lock_path = path;
        self
    }

    /// Override the debugger executable to fork.
    pub fn with_debugger_bin(mut self, path: PathBuf) -> Self {
        self.debugger_bin = Some(path);
        self
    }

    /// Connect to the debugger, forking one if this host wins the lock.
    pub async fn connect(&self) -> Result<DebuggerConnection> {
        // Fast path: a debugger is already serving the endpoint.
        if let Ok(conn) = self.try_connect(PROBE_TIMEOUT).await {
            return Ok(conn);
        }

        for attempt in 0..2 {
            match self.try_lock()? {
                Some(file) => {
                    self.write_lock_info(&file)?;
                    *self.lock.lock().expect("lock slot poisoned") = Some(file);
                    tracing::info!(port = self.config.server_port, "forking debugger process");
                    self.spawn_debugger()?;
                    return self.await_ready(SPAWN_WAIT).await;
                }
                None => {
                    // Someone owns the lock; give their endpoint a chance.
                    if let Ok(conn) = self.await_ready(PROBE_TIMEOUT).await {
                        return Ok(conn);
                    }
                    if attempt == 0 && self.lock_is_stale() {
                        tracing::warn!(path = %self.lock_path.display(), "breaking stale debugger lock");
                        let _ = std::fs::remove_file(&self.lock_path);
                        continue;
                    }
                    break;
                }
            }
        }

        Err(NetlensError::Supervisor(
            "could not acquire the debugger lock nor reach an existing debugger".to_string(),
        ))
    }

    /// Drop the advisory lock if this host owns it.
    pub fn release_lock(&self) {
        let mut slot = self.lock.lock().expect("lock slot poisoned");
        if slot.take().is_some() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }

    /// Non-blocking exclusive lock attempt; `None` means another live
    /// process holds it.
    pub fn try_lock(&self) -> Result<Option<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(file)),
            Err(_) => Ok(None),
        }
    }

    fn write_lock_info(&self, mut file: &File) -> Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            port: self.config.server_port,
            started_at: now_unix_seconds(),
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serde_json::to_string(&info)?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn read_lock_info(&self) -> Option<LockInfo> {
        let mut contents = String::new();
        File::open(&self.lock_path)
            .ok()?
            .read_to_string(&mut contents)
            .ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// A lock whose probe already failed is stale when its owner is gone or
    /// the entry outlived the staleness threshold.
    fn lock_is_stale(&self) -> bool {
        match self.read_lock_info() {
            None => true,
            Some(info) => {
                !pid_alive(info.pid) || now_unix_seconds() - info.started_at > STALE_AFTER_SECS
            }
        }
    }

    fn spawn_debugger(&self) -> Result<()> {
        let bin = self
            .debugger_bin
            .clone()
            .or_else(default_debugger_bin)
            .ok_or_else(|| {
                NetlensError::Supervisor("debugger executable not found".to_string())
            })?;

        let mut command = std::process::Command::new(bin);
        command
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--server-port")
            .arg(self.config.server_port.to_string())
            .arg("--remote-debugger-port")
            .arg(self.config.remote_debugger_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.config.dev_mode {
            command.arg("--dev");
        }
        // Detached: the child outlives this host and is never waited on.
        command
            .spawn()
            .map_err(|e| NetlensError::Supervisor(format!("failed to fork debugger: {e}")))?;
        Ok(())
    }

    /// Poll the endpoint until the debugger answers with `ready`.
    async fn await_ready(&self, budget: Duration) -> Result<DebuggerConnection> {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match self.try_connect(Duration::from_millis(500)).await {
                Ok(conn) => return Ok(conn),
                Err(err) if tokio::time::Instant::now() >= deadline => return Err(err),
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    }

    async fn try_connect(&self, timeout: Duration) -> Result<DebuggerConnection> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.config.ipc_addr()))
            .await
            .map_err(|_| NetlensError::Ipc("connect timed out".to_string()))??;

        let (read_half, writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        tokio::time::timeout(timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| NetlensError::Ipc("timed out waiting for ready".to_string()))??;

        match decode_line(&line)? {
            WireMessage::Ready => Ok(DebuggerConnection { reader, writer }),
            other => Err(NetlensError::Ipc(format!(
                "unexpected greeting: {other:?}"
            ))),
        }
    }
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    // Without a portable liveness probe, lean on the staleness threshold.
    true
}

fn default_debugger_bin() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let sibling = exe
        .parent()?
        .join(format!("netlens-debugger{}", std::env::consts::EXE_SUFFIX));
    if sibling.exists() {
        Some(sibling)
    } else {
        // Fall back to PATH resolution.
        Some(PathBuf::from("netlens-debugger"))
    }
}
