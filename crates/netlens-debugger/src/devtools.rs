//! DevTools WebSocket endpoint
//!
//! Serves the CDP stream the inspector front-end consumes. One front-end at a
//! time: a new connection replaces the previous socket. Outbound frames are
//! unsolicited `Network.*` events; inbound messages are parsed and handed to
//! registered listeners, and the core registers none.
//!
//! Frames sent while no front-end is attached are dropped, not buffered; the
//! panel only shows live traffic.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use netlens_core::error::Result;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type InboundListener = Box<dyn Fn(&Value) + Send + Sync>;

pub struct DevtoolsServer {
    sender: Arc<Mutex<Option<WsSink>>>,
    listeners: Arc<std::sync::Mutex<Vec<InboundListener>>>,
}

impl DevtoolsServer {
    /// Bind the front-end endpoint on loopback.
    pub async fn bind(port: u16) -> Result<(Arc<Self>, TcpListener)> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        info!(addr = %listener.local_addr()?, "devtools endpoint listening");
        let server = Arc::new(Self {
            sender: Arc::new(Mutex::new(None)),
            listeners: Arc::new(std::sync::Mutex::new(Vec::new())),
        });
        Ok((server, listener))
    }

    /// Accept loop; runs until the shutdown signal fires.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "front-end connecting");
                        self.clone().attach(stream).await;
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
                _ = shutdown.recv() => {
                    info!("devtools endpoint shutting down");
                    *self.sender.lock().await = None;
                    return;
                }
            }
        }
    }

    /// Complete the WebSocket handshake and make this socket the active
    /// front-end, replacing any previous one.
    async fn attach(self: Arc<Self>, stream: TcpStream) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                warn!(error = %err, "websocket handshake failed");
                return;
            }
        };
        let (sink, mut reader) = ws.split();
        *self.sender.lock().await = Some(sink);
        info!("front-end attached");

        let server = self.clone();
        tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => server.dispatch_inbound(&value),
                        Err(err) => debug!(error = %err, "unparseable inbound frame"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            debug!("front-end read loop ended");
        });
    }

    /// Register a listener for inbound CDP messages. The core listener set
    /// is empty by design; the hook exists for embedders.
    pub fn on_message(&self, listener: InboundListener) {
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .push(listener);
    }

    fn dispatch_inbound(&self, message: &Value) {
        debug!(method = message.get("method").and_then(|m| m.as_str()).unwrap_or("-"),
               "inbound cdp message");
        for listener in self
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(message);
        }
    }

    /// Send one CDP frame to the attached front-end. Returns whether the
    /// frame was delivered; without a front-end it is dropped.
    pub async fn send_frame(&self, frame: &Value) -> bool {
        let mut guard = self.sender.lock().await;
        let Some(sink) = guard.as_mut() else {
            return false;
        };
        match sink.send(Message::Text(frame.to_string())).await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "front-end send failed, detaching socket");
                *guard = None;
                false
            }
        }
    }
}
