//! Error types
//!
//! Module-scoped errors live next to the code that produces them
//! (`StoreError`, `MonitorError`, `DispatchError`) and reach the wire as
//! ERROR frames; this module holds the item and frame errors and the
//! crate-wide [`Error`] returned by the server and client.

use thiserror::Error;

use crate::protocol::ErrorCode;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for server and client operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid item: {0}")]
    Item(#[from] ItemError),

    /// The peer answered a request with an ERROR frame
    #[error("remote error ({code}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// The connection went away while a request was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// A response stream was not polled fast enough and was cancelled
    #[error("response stream {stream_id} overflowed its buffer and was cancelled")]
    StreamOverflow { stream_id: u32 },

    #[error("operation timed out")]
    Timeout,
}

/// Item payload validation failures
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("id must be a non-empty string")]
    InvalidId,
}

/// Frame encoding/decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("truncated frame: {0}")]
    Truncated(&'static str),

    #[error("route of {0} bytes exceeds 255")]
    RouteTooLong(usize),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),
}
