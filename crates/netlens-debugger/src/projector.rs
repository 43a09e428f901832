//! Record → CDP projection
//!
//! Each completed record becomes four `Network.*` frames, emitted in a fixed
//! order under one `requestId`. The front-end is permissive but treats id
//! continuity and timestamp monotonicity as hard contracts, so both are
//! enforced here even when the wall clock misbehaves.

use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use netlens_core::record::RequestRecord;

/// Projection knobs the protocol leaves open.
#[derive(Debug, Clone)]
pub struct ProjectorOptions {
    /// `request.initialPriority` literal.
    pub initial_priority: String,
    /// `type` literal on `requestWillBeSent`.
    pub resource_type: String,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            initial_priority: "High".to_string(),
            resource_type: "Fetch".to_string(),
        }
    }
}

/// Stateful projector; one per debugger process.
pub struct Projector {
    started: Instant,
    frame_id: String,
    loader_id: String,
    options: ProjectorOptions,
    last_timestamp: f64,
}

impl Projector {
    pub fn new(options: ProjectorOptions) -> Self {
        Self {
            started: Instant::now(),
            // Stable for the whole debugger lifetime.
            frame_id: Uuid::new_v4().simple().to_string(),
            loader_id: Uuid::new_v4().simple().to_string(),
            options,
            last_timestamp: 0.0,
        }
    }

    /// Seconds since projector start, recomputed per frame and clamped so it
    /// never goes backward.
    fn timestamp(&mut self) -> f64 {
        let now = self.started.elapsed().as_secs_f64();
        if now > self.last_timestamp {
            self.last_timestamp = now;
        }
        self.last_timestamp
    }

    /// The four CDP frames for one record, in emission order.
    pub fn project(&mut self, record: &RequestRecord) -> Vec<Value> {
        let content_type = record.response_headers.get("content-type").unwrap_or("");

        let mut request = json!({
            "url": record.url,
            "method": record.method,
            "headers": record.request_headers.to_json_map(),
            "initialPriority": self.options.initial_priority,
            "mixedContentType": "none",
        });
        if let Some(post_data) = record.request_body.as_post_data() {
            request["postData"] = Value::String(post_data);
        }

        let initiator = record
            .initiator
            .as_ref()
            .and_then(|i| serde_json::to_value(i).ok())
            .unwrap_or_else(|| json!({"type": "other"}));

        let will_be_sent = json!({
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": record.id,
                "frameId": self.frame_id,
                "loaderId": self.loader_id,
                "request": request,
                "timestamp": self.timestamp(),
                "wallTime": record.request_start_time,
                "initiator": initiator,
                "type": self.options.resource_type,
            }
        });

        let response_received = json!({
            "method": "Network.responseReceived",
            "params": {
                "requestId": record.id,
                "frameId": self.frame_id,
                "loaderId": self.loader_id,
                "timestamp": self.timestamp(),
                "type": classify(content_type),
                "response": {
                    "url": record.url,
                    "status": record.status.unwrap_or(0),
                    "statusText": status_text(record.status),
                    "headers": record.response_headers.to_json_map(),
                    "connectionReused": false,
                    "encodedDataLength": record.encoded_data_length,
                    "charset": "utf-8",
                    "mimeType": netlens_core::decode::mime_essence(content_type),
                }
            }
        });

        let data_received = json!({
            "method": "Network.dataReceived",
            "params": {
                "requestId": record.id,
                "timestamp": self.timestamp(),
                "dataLength": record.data_length,
                "encodedDataLength": record.encoded_data_length,
            }
        });

        let loading_finished = json!({
            "method": "Network.loadingFinished",
            "params": {
                "requestId": record.id,
                "timestamp": self.timestamp(),
                "encodedDataLength": record.encoded_data_length,
            }
        });

        vec![will_be_sent, response_received, data_received, loading_finished]
    }
}

/// Resource type classification from the response content type.
pub fn classify(content_type: &str) -> &'static str {
    let mime = netlens_core::decode::mime_essence(content_type);
    if mime.starts_with("image/") {
        "Image"
    } else if mime.ends_with("/javascript") {
        "Script"
    } else if mime.ends_with("/css") {
        "Stylesheet"
    } else if mime == "text/html" {
        "Document"
    } else {
        "Other"
    }
}

/// `"OK"` for 200, empty otherwise.
pub fn status_text(status: Option<u16>) -> &'static str {
    if status == Some(200) {
        "OK"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlens_core::headers::HeaderPipe;
    use netlens_core::record::{Body, CallFrame, Initiator};

    fn completed_record(
        method: &str,
        status: u16,
        content_type: &str,
        body: &str,
    ) -> RequestRecord {
        let mut record = RequestRecord::new(
            "http://example.com/a",
            method,
            HeaderPipe::new(),
            None,
        );
        record.status = Some(status);
        record
            .response_headers
            .set("content-type", content_type);
        record.response_body = Some(body.to_string());
        record.encoded_data_length = body.len() as u64;
        record.data_length = body.len() as u64;
        record.finish();
        record
    }

    #[test]
    fn test_plain_text_scenario() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let record = completed_record("GET", 200, "text/plain", "hello");

        let frames = projector.project(&record);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["method"], "Network.requestWillBeSent");
        assert_eq!(frames[1]["method"], "Network.responseReceived");
        assert_eq!(frames[2]["method"], "Network.dataReceived");
        assert_eq!(frames[3]["method"], "Network.loadingFinished");

        assert_eq!(frames[1]["params"]["type"], "Other");
        assert_eq!(frames[1]["params"]["response"]["mimeType"], "text/plain");
        assert_eq!(frames[1]["params"]["response"]["statusText"], "OK");
        assert_eq!(frames[2]["params"]["dataLength"], 5);
    }

    #[test]
    fn test_frames_share_request_id() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let record = completed_record("GET", 200, "text/plain", "x");

        let frames = projector.project(&record);
        let id = frames[0]["params"]["requestId"].as_str().unwrap();
        assert_eq!(id, record.id);
        for frame in &frames {
            assert_eq!(frame["params"]["requestId"], id);
        }
    }

    #[test]
    fn test_timestamps_never_go_backward() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let record = completed_record("GET", 200, "text/plain", "x");

        let frames = projector.project(&record);
        let timestamps: Vec<f64> = frames
            .iter()
            .map(|f| f["params"]["timestamp"].as_f64().unwrap())
            .collect();
        for pair in timestamps.windows(2) {
            assert!(pair[0] <= pair[1]);
        }

        // Across records too: the clamp holds process-wide.
        let more = projector.project(&record);
        assert!(more[0]["params"]["timestamp"].as_f64().unwrap() >= timestamps[3]);
    }

    #[test]
    fn test_json_post_data_is_serialised() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let mut record = completed_record("POST", 200, "text/plain", "ok");
        record.request_body = Body::Json {
            value: serde_json::json!({"k": 1}),
        };

        let frames = projector.project(&record);
        assert_eq!(
            frames[0]["params"]["request"]["postData"],
            "{\"k\":1}"
        );
    }

    #[test]
    fn test_get_without_body_has_no_post_data() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let record = completed_record("GET", 200, "text/plain", "ok");

        let frames = projector.project(&record);
        assert!(frames[0]["params"]["request"].get("postData").is_none());
    }

    #[test]
    fn test_image_with_compression_scenario() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let mut record = completed_record("GET", 200, "image/png", "base64payload");
        record.encoded_data_length = 100;
        record.data_length = 300;
        record.base64_encoded = true;

        let frames = projector.project(&record);
        assert_eq!(frames[1]["params"]["type"], "Image");
        assert_eq!(frames[1]["params"]["response"]["mimeType"], "image/png");
        assert_eq!(frames[1]["params"]["response"]["encodedDataLength"], 100);
        assert_eq!(frames[2]["params"]["dataLength"], 300);
        assert_eq!(frames[2]["params"]["encodedDataLength"], 100);
        assert_eq!(frames[3]["params"]["encodedDataLength"], 100);
    }

    #[test]
    fn test_server_error_still_emits_all_frames() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let record = completed_record("GET", 500, "text/html; charset=utf-8", "boom");

        let frames = projector.project(&record);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1]["params"]["response"]["statusText"], "");
        assert_eq!(frames[1]["params"]["type"], "Document");
        assert_eq!(frames[1]["params"]["response"]["mimeType"], "text/html");
    }

    #[test]
    fn test_initiator_is_projected() {
        let mut projector = Projector::new(ProjectorOptions::default());
        let mut record = completed_record("GET", 200, "text/plain", "x");
        record.initiator = Some(Initiator::script(vec![CallFrame {
            function_name: "app::main".into(),
            url: "file:///srv/app.rs".into(),
            line_number: 10,
            column_number: 2,
            script_id: None,
        }]));

        let frames = projector.project(&record);
        let initiator = &frames[0]["params"]["initiator"];
        assert_eq!(initiator["type"], "script");
        assert_eq!(
            initiator["stack"]["callFrames"][0]["functionName"],
            "app::main"
        );
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify("image/jpeg"), "Image");
        assert_eq!(classify("application/javascript"), "Script");
        assert_eq!(classify("text/javascript; charset=utf-8"), "Script");
        assert_eq!(classify("text/css"), "Stylesheet");
        assert_eq!(classify("text/html"), "Document");
        assert_eq!(classify("application/json"), "Other");
        assert_eq!(classify(""), "Other");
    }
}
