//! Netlens Core Library
//!
//! Core types and codecs for the netlens network debugger. This crate holds
//! the pieces shared by the host-side capture library and the debugger
//! process, and performs no I/O of its own.
//!
//! # Modules
//!
//! - [`record`] - Normalised model of one HTTP exchange
//! - [`headers`] - Case-insensitive header view with mutation
//! - [`initiator`] - Call-stack capture at interception time
//! - [`decode`] - Response body decompression and charset decoding
//! - [`wire`] - Host ↔ debugger message framing
//! - [`config`] - Recognised options and environment mapping
//! - [`error`] - Error types

pub mod config;
pub mod decode;
pub mod error;
pub mod headers;
pub mod initiator;
pub mod record;
pub mod wire;

// Re-export commonly used types
pub use config::Config;
pub use decode::{decode_body, DecodedBody};
pub use error::{NetlensError, Result};
pub use headers::HeaderPipe;
pub use initiator::{BacktraceResolver, InitiatorResolver, NoopResolver};
pub use record::{Body, CallFrame, Initiator, RecordError, RequestRecord};
pub use wire::WireMessage;
