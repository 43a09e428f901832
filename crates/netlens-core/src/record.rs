//! In-memory model of one HTTP exchange
//!
//! A [`RequestRecord`] is created the moment a call is intercepted and is
//! mutated only by the capture path that owns it, in a fixed order: request
//! side first, then body, then response status/headers, then response
//! meta/body. It crosses the IPC boundary exactly once, as a `request_end`
//! message.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::headers::HeaderPipe;

/// Fractional Unix seconds, the clock CDP `wallTime` expects.
pub fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Request body as captured at the client seam.
///
/// Headers and bodies arrive in several dynamic shapes; they are normalised
/// into this tagged union once and converted back at boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Body {
    #[default]
    None,
    Text {
        text: String,
    },
    Bytes {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Json {
        value: serde_json::Value,
    },
}

impl Body {
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// Wire form for `postData`: JSON bodies are serialised, text passed
    /// through, raw bytes rendered lossily. `None` yields no post data.
    pub fn as_post_data(&self) -> Option<String> {
        match self {
            Body::None => None,
            Body::Text { text } => Some(text.clone()),
            Body::Bytes { data } => Some(String::from_utf8_lossy(data).into_owned()),
            Body::Json { value } => Some(value.to_string()),
        }
    }

    /// Raw bytes to put on the wire for the underlying client.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Body::None => None,
            Body::Text { text } => Some(text.clone().into_bytes()),
            Body::Bytes { data } => Some(data.clone()),
            Body::Json { value } => Some(value.to_string().into_bytes()),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&B64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        B64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// One stack frame of the code that issued the request, CDP-shaped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub function_name: String,
    pub url: String,
    /// 0-based.
    pub line_number: u32,
    /// 0-based.
    pub column_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStack {
    pub call_frames: Vec<CallFrame>,
}

/// The call-stack snapshot attributed to the code that made the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initiator {
    /// Always `"script"` for stacks captured in-process.
    #[serde(rename = "type")]
    pub kind: String,
    pub stack: CallStack,
}

impl Initiator {
    pub fn script(call_frames: Vec<CallFrame>) -> Self {
        Self {
            kind: "script".to_string(),
            stack: CallStack { call_frames },
        }
    }
}

/// Failure marker attached to a record that still gets published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Structured kind: `capture`, `decode`, `ipc`, `supervisor`, `browser`.
    pub kind: String,
    pub message: String,
}

impl RecordError {
    pub fn capture(message: impl Into<String>) -> Self {
        Self {
            kind: "capture".to_string(),
            message: message.into(),
        }
    }
}

/// Normalised aggregate of one HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Opaque id, stable from creation until `loadingFinished` is projected.
    pub id: String,
    pub url: String,
    pub method: String,
    pub request_headers: HeaderPipe,
    #[serde(default, skip_serializing_if = "Body::is_none")]
    pub request_body: Body,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub response_headers: HeaderPipe,
    /// Decoded response body; base64 when the payload is binary or decoding
    /// degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default)]
    pub base64_encoded: bool,
    #[serde(default)]
    pub decode_warning: bool,
    /// Wire size of the response body.
    #[serde(default)]
    pub encoded_data_length: u64,
    /// Decompressed size of the response body; equals `encoded_data_length`
    /// when no content-encoding was applied.
    #[serde(default)]
    pub data_length: u64,
    pub request_start_time: f64,
    pub request_end_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub truncated: bool,
}

impl RequestRecord {
    /// Create a record for a freshly intercepted call. Stamps the start time
    /// and generates the id; the initiator is supplied by the resolver the
    /// capture path runs.
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        request_headers: HeaderPipe,
        initiator: Option<Initiator>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            url: url.into(),
            method: method.into(),
            request_headers,
            request_body: Body::None,
            status: None,
            response_headers: HeaderPipe::new(),
            response_body: None,
            base64_encoded: false,
            decode_warning: false,
            encoded_data_length: 0,
            data_length: 0,
            request_start_time: now_unix_seconds(),
            request_end_time: 0.0,
            initiator,
            error: None,
            aborted: false,
            truncated: false,
        }
    }

    /// Stamp the end of the exchange, keeping start ≤ end even when clocks
    /// step backwards between the two reads.
    pub fn finish(&mut self) {
        self.request_end_time = now_unix_seconds().max(self.request_start_time);
    }
}
