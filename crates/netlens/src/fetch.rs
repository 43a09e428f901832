//! Buffered fetch-style capture path
//!
//! The convenience sibling of the streaming client: the whole response body
//! is read once, the caller receives the full bytes (one-shot consumption,
//! enforced by move), and capture reads a copy. Each call produces a record
//! equivalent to the streaming interceptor's.

use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use netlens_core::config::DEFAULT_MAX_BODY_BYTES;
use netlens_core::headers::HeaderPipe;
use netlens_core::initiator::{BacktraceResolver, InitiatorResolver};
use netlens_core::record::{Body, Initiator, RecordError, RequestRecord};

use crate::capture::Capture;
use crate::client::pipe_from_header_map;
use crate::sink::{current_sink, RecordSink};

static FETCH_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Options for one fetch call, mirroring the init-object shape.
#[derive(Default)]
pub struct FetchOptions {
    pub method: Option<String>,
    pub headers: HeaderPipe,
    pub body: Body,
    /// Explicit sink; the globally installed one is used when absent.
    pub sink: Option<Arc<dyn RecordSink>>,
    pub resolver: Option<Arc<dyn InitiatorResolver>>,
}

impl FetchOptions {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// JSON body, pre-serialised into the record's post data.
    pub fn json(mut self, value: serde_json::Value) -> Self {
        if self.headers.get("content-type").is_none() {
            self.headers.set("content-type", "application/json");
        }
        self.body = Body::Json { value };
        self
    }

    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text { text: text.into() };
        self
    }
}

/// Fetch `url` with default options.
pub async fn fetch(url: &str) -> reqwest::Result<FetchResponse> {
    fetch_with(url, FetchOptions::default()).await
}

/// Fetch `url` with explicit options.
pub async fn fetch_with(url: &str, options: FetchOptions) -> reqwest::Result<FetchResponse> {
    let method = options
        .method
        .as_deref()
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .unwrap_or(Method::GET);
    let sink = options.sink.clone().or_else(current_sink);

    let record = sink.as_ref().map(|_| {
        let resolver: Arc<dyn InitiatorResolver> = options
            .resolver
            .clone()
            .unwrap_or_else(|| Arc::new(BacktraceResolver));
        let frames = resolver.capture();
        let initiator = (!frames.is_empty()).then(|| Initiator::script(frames));
        let mut record =
            RequestRecord::new(url, method.as_str(), options.headers.clone(), initiator);
        let (body, truncated) =
            crate::capture::bounded_request_body(&options.body, DEFAULT_MAX_BODY_BYTES);
        record.request_body = body;
        record.truncated = truncated;
        record
    });

    let mut request = FETCH_CLIENT.request(method, url);
    for (name, value) in options.headers.iter() {
        request = request.header(name, value);
    }
    if let Some(bytes) = options.body.to_bytes() {
        request = request.body(bytes);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            if let (Some(mut record), Some(sink)) = (record, sink) {
                record.error = Some(RecordError::capture(err.to_string()));
                record.finish();
                sink.publish(record);
            }
            return Err(err);
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();
    let headers = pipe_from_header_map(response.headers());
    let record = record.map(|mut record| {
        record.status = Some(status.as_u16());
        record.response_headers = headers.clone();
        record
    });
    let mut capture = Capture::new(record, sink, DEFAULT_MAX_BODY_BYTES);

    // One read; the caller gets the bytes, the capture gets the copy.
    match response.bytes().await {
        Ok(bytes) => {
            capture.on_chunk(&bytes);
            capture.finish(false);
            Ok(FetchResponse {
                status,
                url: final_url,
                headers,
                bytes,
            })
        }
        Err(err) => {
            capture.on_stream_error(&err.to_string());
            capture.finish(false);
            Err(err)
        }
    }
}

/// Fully buffered response; body accessors consume it, so the one-shot
/// consumption contract of the fetch surface holds by construction.
#[derive(Debug)]
pub struct FetchResponse {
    status: StatusCode,
    url: String,
    headers: HeaderPipe,
    bytes: Bytes,
}

impl FetchResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderPipe {
        &self.headers
    }

    pub fn bytes(self) -> Bytes {
        self.bytes
    }

    pub fn text(self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn json<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.bytes)
    }
}
