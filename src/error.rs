//! # Error Types
//!
//! Error handling for the session protocol.
//!
//! Every failure in the crate is reported through [`ProtocolError`]; nothing in
//! the library is process-fatal and there is no automatic retry at any layer.
//! A failed call is a terminal outcome for that call only, the endpoint that
//! produced it stays usable.
//!
//! ## Error Categories
//! - **I/O Errors**: socket bind/send/receive failures
//! - **Wire Errors**: malformed datagrams, missing fragments, unknown tags
//! - **Typing Errors**: a typed receive met a value of another type
//! - **Session Errors**: handshake failures, timeouts, not/already connected
//!
//! ## Example Usage
//! ```rust,no_run
//! use udp_session::error::{ProtocolError, Result};
//! use udp_session::Endpoint;
//! use std::time::Duration;
//! use tracing::warn;
//!
//! async fn next_number(endpoint: &mut Endpoint) -> Result<i32> {
//!     match endpoint.receive_int(Some(Duration::from_secs(1))).await {
//!         Err(ProtocolError::TypeMismatch { expected, found }) => {
//!             warn!(%expected, %found, "peer sent something else");
//!             Err(ProtocolError::TypeMismatch { expected, found })
//!         }
//!         other => other,
//!     }
//! }
//! ```

use crate::core::value::TypeTag;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Wire format errors
    pub const ERR_DATAGRAM_TOO_SHORT: &str = "Datagram too short for a length header and tag";
    pub const ERR_FRAGMENT_OVERRUN: &str = "Fragment exceeds the declared message length";
    pub const ERR_FIRST_CHUNK_OVERRUN: &str = "First datagram carries more bytes than declared";
    pub const ERR_EMPTY_PAYLOAD: &str = "Tagged payload is empty";

    /// Codec errors
    pub const ERR_INT_ARRAY_WIDTH: &str = "Int array length is not a multiple of 4";
    pub const ERR_DOUBLE_ARRAY_WIDTH: &str = "Double array length is not a multiple of 8";
    pub const ERR_BOOL_ARRAY_TOO_SHORT: &str = "Bool array needs a marker byte and data";
    pub const ERR_BOOL_ARRAY_MARKER: &str = "Bool array significant-bit marker outside 1..=8";
    pub const ERR_BOOL_VALUE: &str = "Bool must be exactly one byte of 0 or 1";
    pub const ERR_INT_WIDTH: &str = "Int must be exactly 4 bytes";
    pub const ERR_DOUBLE_WIDTH: &str = "Double must be exactly 8 bytes";

    /// Handshake errors
    pub const ERR_INVALID_ECHO_PORT: &str = "Connection echo carries an invalid port";
    pub const ERR_NO_SUITABLE_ADDRESS: &str = "No resolved address matches the socket family";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    #[error("Missing fragment: received {received} of {expected} bytes")]
    MissingFragment { received: usize, expected: usize },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },

    #[error("Unknown type tag: {0}")]
    UnknownTag(u8),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True for the errors that mean "nothing arrived in time".
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout)
    }

    /// True for errors caused by bytes that arrived but could not be understood.
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedDatagram(_)
                | ProtocolError::MissingFragment { .. }
                | ProtocolError::UnknownTag(_)
                | ProtocolError::InvalidFormat(_)
                | ProtocolError::OversizedPayload(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
