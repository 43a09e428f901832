//! Host ↔ debugger wire protocol
//!
//! Newline-delimited JSON over a localhost TCP socket. Messages from one host
//! are delivered in send order; the channel is otherwise stateless.

use serde::{Deserialize, Serialize};

use crate::error::{NetlensError, Result};
use crate::record::RequestRecord;

/// One framed message on the IPC socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// A completed record, serialised exactly once per exchange.
    RequestEnd { record: RequestRecord },
    /// Sent by the debugger to a host as soon as its connection is accepted.
    Ready,
    /// Final message from a host that is shutting down.
    Shutdown,
}

/// Encode a message as one `\n`-terminated JSON line.
pub fn encode_line(message: &WireMessage) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line read off the socket.
pub fn decode_line(line: &str) -> Result<WireMessage> {
    serde_json::from_str(line.trim_end()).map_err(NetlensError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderPipe;

    #[test]
    fn test_control_messages_round_trip() {
        for message in [WireMessage::Ready, WireMessage::Shutdown] {
            let line = encode_line(&message).unwrap();
            assert!(line.ends_with('\n'));
            let parsed = decode_line(&line).unwrap();
            assert!(matches!(
                (&message, &parsed),
                (WireMessage::Ready, WireMessage::Ready)
                    | (WireMessage::Shutdown, WireMessage::Shutdown)
            ));
        }
    }

    #[test]
    fn test_request_end_round_trip() {
        let record = RequestRecord::new("http://example.com/a", "GET", HeaderPipe::new(), None);
        let id = record.id.clone();

        let line = encode_line(&WireMessage::RequestEnd { record }).unwrap();
        match decode_line(&line).unwrap() {
            WireMessage::RequestEnd { record } => assert_eq!(record.id, id),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_tagged_encoding_is_stable() {
        let line = encode_line(&WireMessage::Ready).unwrap();
        assert_eq!(line.trim_end(), r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_garbage_line_is_an_error() {
        assert!(decode_line("not json").is_err());
    }
}
