//! Error taxonomy for the relay client core.

use std::io;

/// Result type used throughout relaycore.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error, grouped by the domain that raised it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure while decoding a typed value from the wire.
    #[error("wire decode error: {0}")]
    Wire(#[from] WireError),

    /// Failure while framing or routing a server message.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Failure raised by the connection controller (socket/TLS/timeout).
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Model-store invariant violation.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Plain I/O error that doesn't fit a more specific domain.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the wire codec (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Fewer bytes were available than the encoding promised.
    #[error("truncated value: expected {expected} bytes, had {actual}")]
    Truncated {
        /// Bytes required to decode the value.
        expected: usize,
        /// Bytes actually remaining in the cursor.
        actual: usize,
    },

    /// An unrecognised 3-byte type tag was encountered where one was expected.
    #[error("unknown type tag: {0:?}")]
    UnknownTag([u8; 3]),

    /// A `lon`/`ptr` ASCII payload did not parse as the expected numeral.
    #[error("malformed numeral in {kind} payload: {text:?}")]
    Malformed {
        /// Which atom kind failed (`lon` or `ptr`).
        kind: &'static str,
        /// The raw text that failed to parse.
        text: String,
    },

    /// A hash table declared a key/value type combination we don't support.
    #[error("unsupported hashtable key/value types: {key:?}/{value:?}")]
    UnsupportedHashTable {
        /// Declared key type tag.
        key: [u8; 3],
        /// Declared value type tag.
        value: [u8; 3],
    },

    /// An HData field's array item type was neither `int` nor `str`.
    #[error("unsupported HData array item type: {0:?}")]
    UnsupportedHDataArray([u8; 3]),

    /// Non-UTF8 bytes where text was required.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
}

/// Errors raised by the message dispatcher (§4.3).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared frame length was smaller than the 5-byte header.
    #[error("invalid frame length {0}")]
    InvalidLength(u32),

    /// A compressed frame was received; payload decompression is unimplemented (non-goal).
    #[error("compressed frames are not supported")]
    Compressed,

    /// The frame body ended before a null-terminated request id was found.
    #[error("missing null-terminated request id")]
    MissingRequestId,
}

/// Errors raised by the connection controller (§4.6).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The underlying TCP connect failed.
    #[error("connect failed: {0}")]
    Connect(io::Error),

    /// TLS handshake or certificate validation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The remote end closed the socket.
    #[error("connection closed by remote")]
    RemoteClosed,

    /// No frame arrived within the response timeout.
    #[error("response timeout after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised by the model store (§4.4).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A line referenced a buffer pointer the store doesn't know about.
    #[error("line references unknown buffer {0:#x}")]
    UnknownBuffer(u64),
}
