//! Datagram transport.
//!
//! [`DatagramSocket`] is a thin wrapper around `tokio::net::UdpSocket` that
//! moves raw byte packets of at most [`MAX_DATAGRAM_SIZE`] bytes. It knows
//! nothing about framing; the socket is closed when the wrapper is dropped.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{trace, warn};

use crate::config::MAX_DATAGRAM_SIZE;
use crate::error::{ProtocolError, Result};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout;

/// One received (or to-be-sent) packet and the peer on the other side of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDatagram {
    pub peer: SocketAddr,
    pub payload: Bytes,
}

impl RawDatagram {
    pub fn new(peer: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            peer,
            payload: payload.into(),
        }
    }
}

/// An unreliable, connectionless socket bound to one local port.
#[derive(Debug)]
pub struct DatagramSocket {
    inner: UdpSocket,
    local_addr: SocketAddr,
}

impl DatagramSocket {
    /// Bind a new socket. Port 0 lets the OS choose an ephemeral port.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let inner = UdpSocket::bind(addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { inner, local_addr })
    }

    /// Address the OS actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram to `peer`
    pub async fn send_to(&self, payload: &[u8], peer: SocketAddr) -> Result<()> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::OversizedPayload(payload.len()));
        }
        let sent = self.inner.send_to(payload, peer).await?;
        global_metrics().datagram_sent(sent as u64);
        trace!(%peer, bytes = sent, "Datagram sent");
        Ok(())
    }

    /// Send without waiting for socket readiness; fails with `WouldBlock` if
    /// the send buffer is full.
    pub fn try_send_to(&self, payload: &[u8], peer: SocketAddr) -> Result<()> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::OversizedPayload(payload.len()));
        }
        let sent = self.inner.try_send_to(payload, peer)?;
        global_metrics().datagram_sent(sent as u64);
        Ok(())
    }

    /// Wait for the next datagram, for at most `timeout` (`None` blocks)
    pub async fn recv(&self, timeout: Option<Duration>) -> Result<RawDatagram> {
        timeout::with_timeout(timeout, self.recv_inner()).await
    }

    /// Datagrams longer than [`MAX_DATAGRAM_SIZE`] are consumed and rejected
    /// rather than truncated.
    async fn recv_inner(&self) -> Result<RawDatagram> {
        // One spare byte tells an oversized datagram from one that fits exactly
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let (n, peer) = self.inner.recv_from(&mut buf).await?;
        global_metrics().datagram_received(n as u64);
        if n > MAX_DATAGRAM_SIZE {
            global_metrics().protocol_error();
            warn!(%peer, "Dropped datagram larger than {MAX_DATAGRAM_SIZE} bytes");
            return Err(ProtocolError::MalformedDatagram(format!(
                "datagram from {peer} exceeds {MAX_DATAGRAM_SIZE} bytes"
            )));
        }
        buf.truncate(n);
        trace!(%peer, bytes = n, "Datagram received");
        Ok(RawDatagram::new(peer, buf))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_send_receive() {
        let a = DatagramSocket::bind("127.0.0.1:0").await.unwrap();
        let b = DatagramSocket::bind("127.0.0.1:0").await.unwrap();

        a.send_to(b"ping", b.local_addr()).await.unwrap();
        let got = b.recv(Some(Duration::from_secs(2))).await.unwrap();

        assert_eq!(got.peer, a.local_addr());
        assert_eq!(&got.payload[..], b"ping");
    }

    #[tokio::test]
    async fn test_recv_times_out() {
        let a = DatagramSocket::bind("127.0.0.1:0").await.unwrap();
        let err = a.recv(Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_oversized_datagram_refused() {
        let a = DatagramSocket::bind("127.0.0.1:0").await.unwrap();
        let err = a
            .send_to(&[0u8; MAX_DATAGRAM_SIZE + 1], a.local_addr())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPayload(1025)));
    }

    #[tokio::test]
    async fn test_oversized_datagram_rejected_on_receive() {
        let raw = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = DatagramSocket::bind("127.0.0.1:0").await.unwrap();

        raw.send_to(&[7u8; MAX_DATAGRAM_SIZE + 80], b.local_addr()).unwrap();
        raw.send_to(&[1u8; MAX_DATAGRAM_SIZE], b.local_addr()).unwrap();

        let err = b.recv(Some(Duration::from_secs(2))).await.unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedDatagram(_)));

        let exact = b.recv(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(exact.payload.len(), MAX_DATAGRAM_SIZE);
    }
}
