//! IPC hub - accepts host connections and collects records
//!
//! Any number of hosts may connect concurrently; each connection is greeted
//! with `ready` and then streams newline-delimited `request_end` messages.
//! Per-connection read order is preserved into the shared record queue, so
//! records from one host reach the projector in send order.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use netlens_core::error::Result;
use netlens_core::record::RequestRecord;
use netlens_core::wire::{decode_line, encode_line, WireMessage};

/// Bind the hub endpoint on loopback.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(addr = %listener.local_addr()?, "ipc hub listening");
    Ok(listener)
}

/// Accept loop; runs until the shutdown signal fires.
pub async fn run(
    listener: TcpListener,
    records_tx: mpsc::UnboundedSender<RequestRecord>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    debug!(%addr, "host connected");
                    tokio::spawn(handle_host(stream, records_tx.clone()));
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
            _ = shutdown.recv() => {
                info!("ipc hub shutting down");
                return;
            }
        }
    }
}

/// One host connection: greet, then drain its record stream.
async fn handle_host(stream: TcpStream, records_tx: mpsc::UnboundedSender<RequestRecord>) {
    let (read_half, mut write_half) = stream.into_split();

    let greeting = match encode_line(&WireMessage::Ready) {
        Ok(greeting) => greeting,
        Err(err) => {
            warn!(error = %err, "could not encode greeting");
            return;
        }
    };
    if write_half.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        match decode_line(&line) {
            Ok(WireMessage::RequestEnd { record }) => {
                if records_tx.send(record).is_err() {
                    return;
                }
            }
            Ok(WireMessage::Shutdown) => {
                debug!("host sent shutdown");
                break;
            }
            Ok(WireMessage::Ready) => {}
            Err(err) => {
                warn!(error = %err, "unparseable frame from host");
            }
        }
    }
    debug!("host disconnected");
}
