//! # Fragmentation and Reassembly
//!
//! A message is one frame, `[Length(4)][Tag(1)][Body]`, cut into datagrams of at
//! most [`MAX_DATAGRAM_SIZE`] bytes. The first datagram therefore carries the
//! length header plus up to [`FIRST_CHUNK_CAPACITY`] payload bytes; every
//! following datagram is raw continuation with no header, index or checksum.
//! Order is implied by arrival order from the same peer.
//!
//! [`Reassembly`] is the receiving half: it is seeded with the first datagram and
//! fed continuations until the declared length is reached. It never under- or
//! over-reads the declared length.

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{FIRST_CHUNK_CAPACITY, MAX_DATAGRAM_SIZE};
use crate::core::codec::{TaggedCodec, LENGTH_HEADER_SIZE};
use crate::core::value::Value;
use crate::error::{constants, ProtocolError, Result};

/// Smallest datagram that can open a message: length header plus a tag byte
pub const MIN_FIRST_DATAGRAM: usize = LENGTH_HEADER_SIZE + 1;

/// Cut an encoded frame into datagram-sized pieces.
///
/// The pieces share the frame's allocation.
pub fn split_frame(frame: Bytes) -> Vec<Bytes> {
    let mut datagrams = Vec::with_capacity(frame.len().div_ceil(MAX_DATAGRAM_SIZE).max(1));
    let mut rest = frame;
    while rest.len() > MAX_DATAGRAM_SIZE {
        datagrams.push(rest.split_to(MAX_DATAGRAM_SIZE));
    }
    datagrams.push(rest);
    datagrams
}

/// Frame and fragment an already tagged payload
pub fn fragment_payload(payload: &[u8], codec: &TaggedCodec) -> Result<Vec<Bytes>> {
    codec.check_len(payload.len())?;

    let mut frame = BytesMut::with_capacity(LENGTH_HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(split_frame(frame.freeze()))
}

/// Encode, frame and fragment a value
pub fn fragment_value(value: &Value, codec: &mut TaggedCodec) -> Result<Vec<Bytes>> {
    let mut frame = BytesMut::new();
    codec.encode(value, &mut frame)?;
    Ok(split_frame(frame.freeze()))
}

/// In-progress reconstruction of one message from one peer.
#[derive(Debug)]
pub struct Reassembly {
    peer: SocketAddr,
    expected: usize,
    frame: BytesMut,
}

impl Reassembly {
    /// Start reassembling from the first datagram of a message
    pub fn begin(peer: SocketAddr, first: &[u8], codec: &TaggedCodec) -> Result<Self> {
        if first.len() < MIN_FIRST_DATAGRAM {
            return Err(ProtocolError::MalformedDatagram(format!(
                "{} ({} bytes)",
                constants::ERR_DATAGRAM_TOO_SHORT,
                first.len()
            )));
        }

        let expected = u32::from_be_bytes([first[0], first[1], first[2], first[3]]) as usize;
        codec.check_len(expected)?;

        if first.len() - LENGTH_HEADER_SIZE > expected {
            return Err(ProtocolError::MalformedDatagram(
                constants::ERR_FIRST_CHUNK_OVERRUN.into(),
            ));
        }

        let mut frame = BytesMut::with_capacity(LENGTH_HEADER_SIZE + expected);
        frame.put_slice(first);
        Ok(Self {
            peer,
            expected,
            frame,
        })
    }

    /// Peer every remaining fragment must come from
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Declared payload length
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Payload bytes accumulated so far
    pub fn received(&self) -> usize {
        self.frame.len() - LENGTH_HEADER_SIZE
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.expected
    }

    /// Append one continuation datagram
    pub fn push(&mut self, continuation: &[u8]) -> Result<()> {
        if self.received() + continuation.len() > self.expected {
            return Err(ProtocolError::MalformedDatagram(format!(
                "{} ({} + {} > {})",
                constants::ERR_FRAGMENT_OVERRUN,
                self.received(),
                continuation.len(),
                self.expected
            )));
        }
        self.frame.put_slice(continuation);
        Ok(())
    }

    /// Error describing how far this reassembly got
    pub fn missing(&self) -> ProtocolError {
        ProtocolError::MissingFragment {
            received: self.received(),
            expected: self.expected,
        }
    }

    /// The raw tagged payload, without the length header
    pub fn into_payload(mut self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(self.missing());
        }
        Ok(self.frame.split_off(LENGTH_HEADER_SIZE).freeze())
    }

    /// Decode the completed frame into a value
    pub fn into_value(mut self, codec: &mut TaggedCodec) -> Result<Value> {
        if !self.is_complete() {
            return Err(self.missing());
        }
        codec
            .decode(&mut self.frame)?
            .ok_or_else(|| self.missing())
    }
}
