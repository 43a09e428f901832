//! Loopback HTTP fixtures for interceptor tests.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub(crate) struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CannedResponse {
    pub fn text(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn with_status(status: u16, content_type: &str, body: &[u8]) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), content_type.into())],
            body: body.to_vec(),
        }
    }
}

/// Serve exactly one canned HTTP/1.1 exchange on an ephemeral loopback port.
pub(crate) async fn serve_once(response: CannedResponse) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        // Read the whole request (head plus any content-length body) so the
        // client never sees a reset with unread data in flight.
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let mut total_len: Option<usize> = None;
        loop {
            if let Some(total) = total_len {
                if request.len() >= total {
                    break;
                }
            }
            match socket.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    request.extend_from_slice(&buf[..n]);
                    if total_len.is_none() {
                        if let Some(head_end) =
                            request.windows(4).position(|w| w == b"\r\n\r\n")
                        {
                            let head = String::from_utf8_lossy(&request[..head_end]);
                            let body_len = head
                                .lines()
                                .find_map(|line| {
                                    let (name, value) = line.split_once(':')?;
                                    name.trim()
                                        .eq_ignore_ascii_case("content-length")
                                        .then(|| value.trim().parse::<usize>().ok())?
                                })
                                .unwrap_or(0);
                            total_len = Some(head_end + 4 + body_len);
                        }
                    }
                }
                Err(_) => return,
            }
        }

        let reason = if response.status == 200 { "OK" } else { "X" };
        let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
        for (name, value) in &response.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!("content-length: {}\r\n", response.body.len()));
        head.push_str("connection: close\r\n\r\n");

        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&response.body).await;
        let _ = socket.shutdown().await;
    });

    addr
}
