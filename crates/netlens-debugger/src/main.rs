//! Netlens debugger process
//!
//! The single per-machine process that receives records from instrumented
//! hosts, projects them into CDP `Network.*` events, and serves the DevTools
//! front-end. Normally forked by the host library's supervisor; the flags
//! make it usable standalone for manual attach.

use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use netlens_core::config::{
    Config, DEFAULT_PORT, DEFAULT_REMOTE_DEBUGGER_PORT, DEFAULT_SERVER_PORT,
};

use netlens_debugger::projector::{Projector, ProjectorOptions};
use netlens_debugger::{browser, devtools, hub};

/// Netlens debugger - streams intercepted HTTP traffic to Chrome DevTools.
#[derive(Parser, Debug)]
#[command(name = "netlens-debugger")]
#[command(version, about, long_about = None)]
struct Args {
    /// DevTools front-end WebSocket port
    #[arg(long, env = "NETWORK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host IPC port
    #[arg(long, env = "NETWORK_SERVER_PORT", default_value_t = DEFAULT_SERVER_PORT)]
    server_port: u16,

    /// Chromium remote-debugging port
    #[arg(long, env = "REMOTE_DEBUGGER_PORT", default_value_t = DEFAULT_REMOTE_DEBUGGER_PORT)]
    remote_debugger_port: u16,

    /// Suppress the automatic browser launch
    #[arg(long, env = "NETWORK_DEBUG_MODE")]
    dev: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            port: self.port,
            server_port: self.server_port,
            remote_debugger_port: self.remote_debugger_port,
            dev_mode: self.dev,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Args::parse().into_config();

    match run(config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(kind = err.kind(), error = %err, "debugger failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> netlens_core::Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Front-end endpoint first, so a launched browser has something to hit.
    let (devtools, devtools_listener) = devtools::DevtoolsServer::bind(config.port).await?;
    tokio::spawn(
        devtools
            .clone()
            .run(devtools_listener, shutdown_tx.subscribe()),
    );

    // Host IPC hub.
    let hub_listener = hub::bind(config.server_port).await?;
    let (records_tx, mut records_rx) = mpsc::unbounded_channel();
    tokio::spawn(hub::run(hub_listener, records_tx, shutdown_tx.subscribe()));

    // Record pump: one record in, four frames out, in order.
    let pump_devtools = devtools.clone();
    let mut pump_shutdown = shutdown_tx.subscribe();
    let pump = tokio::spawn(async move {
        let mut projector = Projector::new(ProjectorOptions::default());
        loop {
            tokio::select! {
                record = records_rx.recv() => match record {
                    Some(record) => {
                        for frame in projector.project(&record) {
                            pump_devtools.send_frame(&frame).await;
                        }
                        // The record is dropped here, after its final frame.
                    }
                    None => return,
                },
                _ = pump_shutdown.recv() => return,
            }
        }
    });

    // Browser launch is best effort; the debugger outlives its failure.
    let mut browser_child = None;
    if config.dev_mode {
        info!("dev mode, skipping browser launch");
    } else {
        match browser::open_inspector(&config).await {
            Ok(child) => browser_child = child,
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "browser launch failed, attach manually");
                info!(url = %config.inspector_url(), "inspector url");
            }
        }
    }

    info!(
        port = config.port,
        server_port = config.server_port,
        "debugger ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(());
    let _ = pump.await;
    if let Some(mut child) = browser_child {
        let _ = child.kill();
    }
    Ok(())
}
