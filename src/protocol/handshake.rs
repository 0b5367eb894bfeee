//! Handshake and control literals.
//!
//! Control signals travel as ordinary tagged string messages:
//! - the client sends [`CONNECTION_REQUEST`] to the server's well-known port
//! - the server answers [`CONNECTION_ECHO`] followed by the decimal port the
//!   rest of the session should use (surrounding whitespace is tolerated)
//! - either side may send [`DISCONNECTION`] to end the session
//!
//! Everything here is pure; the async flows that drive these messages live on
//! [`Endpoint`](crate::Endpoint).

use crate::core::codec::LENGTH_HEADER_SIZE;
use crate::core::value::{TypeTag, Value};
use crate::error::{constants, ProtocolError, Result};

/// Sent by a client to open a session
pub const CONNECTION_REQUEST: &str = "</%/connectionRequest/%/>";

/// Prefix of the server's reply; the session port follows it
pub const CONNECTION_ECHO: &str = "</%/connectionEcho/%/>";

/// Sent by either side to close a session
pub const DISCONNECTION: &str = "</%/disconnection/%/>";

pub fn connection_request() -> Value {
    Value::from(CONNECTION_REQUEST)
}

pub fn connection_echo(port: u16) -> Value {
    Value::String(format!("{CONNECTION_ECHO}{port}"))
}

pub fn disconnection() -> Value {
    Value::from(DISCONNECTION)
}

pub fn is_connection_request(text: &str) -> bool {
    text == CONNECTION_REQUEST
}

/// Exact match against the disconnection sentinel
pub fn is_disconnection(text: &str) -> bool {
    text == DISCONNECTION
}

/// Parse a connection echo.
///
/// `None` if `text` is not an echo at all; `Some(Err)` if it is one but the
/// port cannot be read or is 0.
pub fn parse_connection_echo(text: &str) -> Option<Result<u16>> {
    let port = text.strip_prefix(CONNECTION_ECHO)?;
    let parsed = match port.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ProtocolError::HandshakeError(format!(
            "{}: {port:?}",
            constants::ERR_INVALID_ECHO_PORT
        ))),
        Ok(port) => Ok(port),
    };
    Some(parsed)
}

/// Text of a datagram that holds one complete tagged string message.
///
/// Control messages always fit in one datagram, so anything else (a fragment,
/// another type, invalid UTF-8) is simply not a control message.
pub fn single_datagram_text(datagram: &[u8]) -> Option<&str> {
    if datagram.len() < LENGTH_HEADER_SIZE {
        return None;
    }
    let (header, payload) = datagram.split_at(LENGTH_HEADER_SIZE);
    let declared = u32::from_be_bytes(header.try_into().ok()?) as usize;
    if declared != payload.len() {
        return None;
    }
    match payload.split_first()? {
        (&tag, body) if tag == TypeTag::String.as_byte() => std::str::from_utf8(body).ok(),
        _ => None,
    }
}

/// True if the datagram is a complete disconnection message
pub fn is_disconnection_datagram(datagram: &[u8]) -> bool {
    single_datagram_text(datagram).is_some_and(is_disconnection)
}
