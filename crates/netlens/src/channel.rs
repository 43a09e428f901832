//! Host-side IPC channel
//!
//! Streams `request_end` messages to the debugger in send order. While the
//! debugger is away the channel buffers up to a high-water mark, dropping the
//! oldest record past it; the running drop count is surfaced to the logs.
//! Reconnection backs off exponentially from 100 ms to 5 s and never gives
//! up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use netlens_core::wire::{encode_line, WireMessage};

use crate::supervisor::{DebuggerConnection, Supervisor};

const BACKOFF_MIN: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Push with drop-oldest overflow.
pub(crate) fn buffer_push(
    buffer: &mut VecDeque<WireMessage>,
    message: WireMessage,
    limit: usize,
    dropped: &mut u64,
) {
    if buffer.len() >= limit {
        buffer.pop_front();
        *dropped += 1;
        tracing::warn!(dropped = *dropped, "record buffer full, dropped oldest");
    }
    buffer.push_back(message);
}

async fn write_message(
    conn: &mut DebuggerConnection,
    message: &WireMessage,
) -> std::io::Result<()> {
    let line = encode_line(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    conn.writer.write_all(line.as_bytes()).await?;
    conn.writer.flush().await
}

/// Channel task: owns the connection and the retention buffer.
pub(crate) async fn run(
    supervisor: Arc<Supervisor>,
    mut rx: mpsc::UnboundedReceiver<WireMessage>,
    buffer_limit: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buffer: VecDeque<WireMessage> = VecDeque::new();
    let mut dropped: u64 = 0;
    let mut backoff = BACKOFF_MIN;

    'reconnect: loop {
        // Establish a connection, buffering records that arrive meanwhile.
        let mut conn = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    supervisor.release_lock();
                    return;
                }
                result = supervisor.connect() => match result {
                    Ok(conn) => {
                        backoff = BACKOFF_MIN;
                        break conn;
                    }
                    Err(err) => {
                        tracing::warn!(kind = err.kind(), error = %err, "debugger unavailable, retrying");
                        let sleep = tokio::time::sleep(backoff);
                        tokio::pin!(sleep);
                        loop {
                            tokio::select! {
                                _ = &mut sleep => break,
                                _ = shutdown.recv() => {
                                    supervisor.release_lock();
                                    return;
                                }
                                msg = rx.recv() => match msg {
                                    Some(msg) => buffer_push(&mut buffer, msg, buffer_limit, &mut dropped),
                                    None => {
                                        supervisor.release_lock();
                                        return;
                                    }
                                }
                            }
                        }
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                    }
                }
            }
        };

        // Flush everything retained while disconnected, oldest first.
        while let Some(message) = buffer.pop_front() {
            if let Err(err) = write_message(&mut conn, &message).await {
                tracing::debug!(error = %err, "flush failed, reconnecting");
                buffer.push_front(message);
                continue 'reconnect;
            }
        }

        // Steady state: forward records as they arrive and keep the read
        // half drained so a hangup is noticed promptly.
        let mut line = String::new();
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(message) => {
                        if let Err(err) = write_message(&mut conn, &message).await {
                            tracing::debug!(error = %err, "write failed, reconnecting");
                            buffer_push(&mut buffer, message, buffer_limit, &mut dropped);
                            continue 'reconnect;
                        }
                    }
                    None => {
                        let _ = write_message(&mut conn, &WireMessage::Shutdown).await;
                        supervisor.release_lock();
                        return;
                    }
                },
                _ = shutdown.recv() => {
                    let _ = write_message(&mut conn, &WireMessage::Shutdown).await;
                    supervisor.release_lock();
                    return;
                }
                result = conn.reader.read_line(&mut line) => match result {
                    Ok(0) | Err(_) => {
                        tracing::debug!("debugger hung up, reconnecting");
                        continue 'reconnect;
                    }
                    Ok(_) => line.clear(),
                }
            }
        }
    }
}
