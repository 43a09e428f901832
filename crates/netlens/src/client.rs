//! Instrumented HTTP client
//!
//! [`Client`] wraps `reqwest::Client` and exposes the same request surface.
//! Interception is a side channel: bytes, event ordering, and the error
//! surface the caller sees are those of the unwrapped client. The response
//! body is teed: every chunk is forwarded unaltered while a bounded copy
//! accumulates for the record, and back-pressure flows from the caller, not
//! from the capture buffer.
//!
//! With no sink installed (and none set explicitly) every call is pure
//! passthrough.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Method, StatusCode};
use serde::Serialize;

use netlens_core::config::DEFAULT_MAX_BODY_BYTES;
use netlens_core::headers::HeaderPipe;
use netlens_core::initiator::{BacktraceResolver, InitiatorResolver};
use netlens_core::record::{Body, Initiator, RecordError, RequestRecord};

use crate::capture::Capture;
use crate::sink::{current_sink, RecordSink};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// HTTP client with side-channel capture.
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
    max_body_bytes: usize,
    resolver: Arc<dyn InitiatorResolver>,
    sink_override: Option<Arc<dyn RecordSink>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wrap an already-configured `reqwest::Client`.
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self {
            inner,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            resolver: Arc::new(BacktraceResolver),
            sink_override: None,
        }
    }

    /// Cap on the captured copy of each response body.
    pub fn max_body_bytes(mut self, cap: usize) -> Self {
        self.max_body_bytes = cap;
        self
    }

    /// Swap the initiator resolver.
    pub fn resolver(mut self, resolver: Arc<dyn InitiatorResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Publish to an explicit sink instead of the globally installed one.
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.into(),
            headers: HeaderPipe::new(),
            body: Body::None,
        }
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    fn effective_sink(&self) -> Option<Arc<dyn RecordSink>> {
        self.sink_override.clone().or_else(current_sink)
    }
}

/// Builder mirroring the wrapped client's request surface.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: HeaderPipe,
    body: Body,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text { text: text.into() };
        self
    }

    pub fn body_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes { data: data.into() };
        self
    }

    /// JSON body; sets `content-type: application/json` unless the caller
    /// already chose one.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.body = Body::Json {
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        };
        if self.headers.get("content-type").is_none() {
            self.headers.set("content-type", "application/json");
        }
        self
    }

    /// Send the request. The returned error is the unwrapped client's error,
    /// unchanged; a record is still published with whatever is known.
    pub async fn send(self) -> reqwest::Result<Response> {
        let sink = self.client.effective_sink();
        let record = sink.as_ref().map(|_| {
            let frames = self.client.resolver.capture();
            let initiator = (!frames.is_empty()).then(|| Initiator::script(frames));
            let mut record =
                RequestRecord::new(&self.url, self.method.as_str(), self.headers.clone(), initiator);
            let (body, truncated) =
                crate::capture::bounded_request_body(&self.body, self.client.max_body_bytes);
            record.request_body = body;
            record.truncated = truncated;
            record
        });

        let mut request = self.client.inner.request(self.method.clone(), self.url.as_str());
        for (name, value) in self.headers.iter() {
            request = request.header(name, value);
        }
        if let Some(bytes) = self.body.to_bytes() {
            request = request.body(bytes);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();
                let headers = pipe_from_header_map(response.headers());

                let record = record.map(|mut record| {
                    record.status = Some(status.as_u16());
                    record.response_headers = headers.clone();
                    record
                });
                let capture = Capture::new(record, sink, self.client.max_body_bytes);

                Ok(Response {
                    status,
                    url,
                    headers,
                    stream: Some(Box::pin(response.bytes_stream())),
                    capture,
                })
            }
            Err(err) => {
                if let (Some(mut record), Some(sink)) = (record, sink) {
                    record.error = Some(RecordError::capture(err.to_string()));
                    record.finish();
                    sink.publish(record);
                }
                Err(err)
            }
        }
    }
}

/// Streaming response with a teed body.
pub struct Response {
    status: StatusCode,
    url: String,
    headers: HeaderPipe,
    stream: Option<ByteStream>,
    capture: Capture,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderPipe {
        &self.headers
    }

    /// Next body chunk, exactly as the unwrapped client yields it.
    pub async fn chunk(&mut self) -> reqwest::Result<Option<Bytes>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(chunk)) => {
                self.capture.on_chunk(&chunk);
                Ok(Some(chunk))
            }
            Some(Err(err)) => {
                self.capture.on_stream_error(&err.to_string());
                self.capture.finish(false);
                self.stream = None;
                Err(err)
            }
            None => {
                self.capture.finish(false);
                self.stream = None;
                Ok(None)
            }
        }
    }

    /// Read the remaining body to completion.
    pub async fn bytes(mut self) -> reqwest::Result<Bytes> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.into())
    }

    /// Read the remaining body as text (lossy UTF-8, matching what the
    /// record decoder would do without a charset hint).
    pub async fn text(self) -> reqwest::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub(crate) fn pipe_from_header_map(map: &reqwest::header::HeaderMap) -> HeaderPipe {
    map.iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
