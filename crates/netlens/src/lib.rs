//! Netlens host library
//!
//! In-process HTTP capture for the netlens network debugger. The host calls
//! [`install`] once at startup; from then on every exchange made through
//! [`client::Client`] or [`fetch::fetch`] is reassembled into a request
//! record and streamed to the debugger process, which projects it into the
//! Chrome DevTools Network panel.
//!
//! Capture is strictly a side channel: the bytes, ordering, and errors a
//! caller observes are those of the unwrapped HTTP client, and any failure in
//! the capture pipeline is logged and attached to the record rather than
//! raised into the host's request path. Until `install` succeeds (or after
//! [`uninstall`]) all capture surfaces are pure passthrough.
//!
//! # Example
//!
//! ```ignore
//! let handle = netlens::install(netlens_core::Config::from_env()).await?;
//!
//! let client = netlens::client::Client::new();
//! let body = client.get("https://example.com").send().await?.text().await?;
//!
//! handle.shutdown().await;
//! ```

pub mod client;
pub mod fetch;
pub mod sink;
pub mod supervisor;

mod capture;
mod channel;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use netlens_core::error::Result;

pub use netlens_core::Config;

pub use client::{Client, RequestBuilder, Response};
pub use fetch::{fetch, fetch_with, FetchOptions, FetchResponse};
pub use sink::{install_sink, uninstall_sink, CollectorSink, RecordSink};
pub use supervisor::Supervisor;

/// Handle to an installed capture pipeline.
pub struct DebuggerHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl DebuggerHandle {
    /// Flush, send the final shutdown message, and release the lock if this
    /// host owns it. Capture surfaces revert to passthrough.
    pub async fn shutdown(self) {
        sink::uninstall_sink();
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// Start supervision and install the channel sink.
///
/// A supervision failure is surfaced here, exactly once; the host keeps
/// running uninstrumented in that case. Must be called from within a tokio
/// runtime.
pub async fn install(config: Config) -> Result<DebuggerHandle> {
    let supervisor = Arc::new(Supervisor::new(config.clone()));

    // Validate supervision up front so the host learns about a broken setup
    // at initialisation instead of silently losing records.
    supervisor.connect().await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(channel::run(
        supervisor,
        rx,
        config.buffer_limit,
        shutdown_rx,
    ));
    sink::install_sink(Arc::new(sink::ChannelSink::new(tx)));

    tracing::info!(
        server_port = config.server_port,
        "netlens capture installed"
    );
    Ok(DebuggerHandle { shutdown_tx, task })
}

/// Revert the capture surfaces to passthrough without tearing the channel
/// down; the counterpart of [`install`] that tests rely on.
pub fn uninstall() {
    sink::uninstall_sink();
}
