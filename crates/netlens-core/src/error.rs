//! Centralized error types
//!
//! One structured error enum covers the capture, transport, supervision, and
//! projection layers. Errors in the capture pipeline are logged and attached
//! to records; they never reach the host application's request path.

use thiserror::Error;

/// Failure kinds across the debugger pipeline.
#[derive(Debug, Error)]
pub enum NetlensError {
    /// Interceptor internal failure; swallowed relative to the caller.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The body decoder could not decompress or decode a payload.
    #[error("decode failed: {0}")]
    Decode(String),

    /// IPC transport failure between host and debugger.
    #[error("ipc transport failed: {0}")]
    Ipc(String),

    /// Could not acquire the debugger lock nor connect to an existing one.
    #[error("supervisor failed: {0}")]
    Supervisor(String),

    /// The inspector browser could not be opened.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NetlensError {
    /// Structured kind string used in logs and record error markers.
    pub fn kind(&self) -> &'static str {
        match self {
            NetlensError::Capture(_) => "capture",
            NetlensError::Decode(_) => "decode",
            NetlensError::Ipc(_) => "ipc",
            NetlensError::Supervisor(_) => "supervisor",
            NetlensError::BrowserLaunch(_) => "browser",
            NetlensError::Io(_) => "io",
            NetlensError::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, NetlensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(NetlensError::Capture("x".into()).kind(), "capture");
        assert_eq!(NetlensError::Supervisor("x".into()).kind(), "supervisor");
        assert_eq!(
            NetlensError::BrowserLaunch("no chrome".into()).kind(),
            "browser"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: NetlensError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("refused"));
    }
}
