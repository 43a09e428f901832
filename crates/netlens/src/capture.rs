//! Shared response-capture engine
//!
//! Both capture paths feed response bytes through a [`Capture`]: chunks are
//! copied into a bounded buffer while the caller's stream is forwarded
//! untouched, and when the exchange ends (normally, with an error, or by the
//! caller dropping the body) the record is finalised and published exactly
//! once.

use std::sync::Arc;

use netlens_core::decode::decode_body;
use netlens_core::record::{Body, RecordError, RequestRecord};

use crate::sink::RecordSink;

/// Bound a request body to the capture cap. Oversized payloads keep a
/// truncated prefix; a JSON body that no longer fits is kept as truncated
/// text, since a cut JSON document is no longer a value.
pub(crate) fn bounded_request_body(body: &Body, cap: usize) -> (Body, bool) {
    match body {
        Body::None => (Body::None, false),
        Body::Text { text } => {
            if text.len() <= cap {
                (Body::Text { text: text.clone() }, false)
            } else {
                (
                    Body::Text {
                        text: truncate_at_char_boundary(text, cap),
                    },
                    true,
                )
            }
        }
        Body::Bytes { data } => {
            if data.len() <= cap {
                (Body::Bytes { data: data.clone() }, false)
            } else {
                (
                    Body::Bytes {
                        data: data[..cap].to_vec(),
                    },
                    true,
                )
            }
        }
        Body::Json { value } => {
            let serialised = value.to_string();
            if serialised.len() <= cap {
                (
                    Body::Json {
                        value: value.clone(),
                    },
                    false,
                )
            } else {
                (
                    Body::Text {
                        text: truncate_at_char_boundary(&serialised, cap),
                    },
                    true,
                )
            }
        }
    }
}

fn truncate_at_char_boundary(text: &str, cap: usize) -> String {
    let mut idx = cap;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    text[..idx].to_string()
}

pub(crate) struct Capture {
    record: Option<RequestRecord>,
    sink: Option<Arc<dyn RecordSink>>,
    buf: Vec<u8>,
    received: u64,
    cap: usize,
    truncated: bool,
    content_encoding: Option<String>,
    content_type: Option<String>,
}

impl Capture {
    /// A capture for one exchange. `record` already carries the request side
    /// and the response status/headers; `None` disables capture entirely
    /// (passthrough mode).
    pub(crate) fn new(
        record: Option<RequestRecord>,
        sink: Option<Arc<dyn RecordSink>>,
        cap: usize,
    ) -> Self {
        let content_encoding = record
            .as_ref()
            .and_then(|r| r.response_headers.get("content-encoding"))
            .map(str::to_string);
        let content_type = record
            .as_ref()
            .and_then(|r| r.response_headers.get("content-type"))
            .map(str::to_string);
        Self {
            record,
            sink,
            buf: Vec::new(),
            received: 0,
            cap,
            truncated: false,
            content_encoding,
            content_type,
        }
    }

    /// Account one forwarded chunk. The copy stops at the cap; the caller's
    /// stream never does.
    pub(crate) fn on_chunk(&mut self, chunk: &[u8]) {
        if self.record.is_none() {
            return;
        }
        self.received += chunk.len() as u64;
        let room = self.cap.saturating_sub(self.buf.len());
        if room >= chunk.len() {
            self.buf.extend_from_slice(chunk);
        } else {
            self.buf.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        }
    }

    /// Attach a capture error marker without ending the capture; the stream
    /// error itself still surfaces to the caller.
    pub(crate) fn on_stream_error(&mut self, message: &str) {
        if let Some(record) = self.record.as_mut() {
            record.error = Some(RecordError::capture(message));
        }
    }

    /// Finalise and publish. Idempotent; later calls are no-ops, so the drop
    /// handler can call it unconditionally.
    pub(crate) fn finish(&mut self, aborted: bool) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        let Some(sink) = self.sink.take() else {
            return;
        };

        record.aborted = record.aborted || aborted;
        if aborted && record.error.is_none() {
            record.error = Some(RecordError::capture("caller aborted before end of response"));
        }
        record.truncated = record.truncated || self.truncated;
        record.encoded_data_length = self.received;

        let compressed = self
            .content_encoding
            .as_deref()
            .is_some_and(|e| !e.eq_ignore_ascii_case("identity"));
        let decoded = decode_body(
            &self.buf,
            self.content_encoding.as_deref(),
            self.content_type.as_deref(),
        );
        record.data_length = if compressed && !decoded.warning {
            // Decompressed size; clamped so a pathological stream cannot
            // report less data than arrived on the wire.
            decoded.decoded_len.max(self.received)
        } else {
            self.received
        };
        record.response_body = Some(decoded.text);
        record.base64_encoded = decoded.base64_encoded;
        record.decode_warning = decoded.warning;
        record.finish();

        sink.publish(record);
    }

    #[cfg(test)]
    pub(crate) fn received(&self) -> u64 {
        self.received
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        // A capture dropped before its stream ended means the caller walked
        // away; publish what is known.
        self.finish(true);
    }
}
