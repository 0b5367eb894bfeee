//! Session state.
//!
//! One [`Session`] per endpoint records where the handshake stands and, once
//! established, which peer the conversation is committed to. It only changes
//! through the handshake operations, explicit disconnection, or a
//! disconnection observed from the committed peer.
//!
//! ```text
//!  Idle ──request sent──▶ AwaitingReply ──echo──▶ Established
//!   │                          │ timeout                │
//!   │                          ▼                        │ disconnection
//!   ├──────────────────────▶ Idle ◀─────────────────────┘
//!   └──wait_client──▶ AwaitingRequest ──echo sent──▶ Idle
//! ```
//! On the server side the listener socket never becomes `Established` itself;
//! the per-client endpoint does, through [`Session::establish`].

use std::fmt;
use std::net::SocketAddr;

use tracing::info;

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake;
use crate::transport::datagram::RawDatagram;
use crate::utils::metrics::global_metrics;

/// Where a session stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    /// Client: request sent, waiting for the echo
    AwaitingReply,
    /// Server: waiting for a connection request
    AwaitingRequest,
    Established,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Default)]
pub struct Session {
    state: HandshakeState,
    committed_peer: Option<SocketAddr>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// The committed peer, only while connected
    pub fn committed_peer(&self) -> Option<SocketAddr> {
        if self.is_connected() {
            self.committed_peer
        } else {
            None
        }
    }

    /// Enter `AwaitingReply`
    pub fn begin_client_handshake(&mut self) -> Result<()> {
        self.ensure_not_connected()?;
        self.state = HandshakeState::AwaitingReply;
        Ok(())
    }

    /// Enter `AwaitingRequest`
    pub fn begin_server_handshake(&mut self) -> Result<()> {
        self.ensure_not_connected()?;
        self.state = HandshakeState::AwaitingRequest;
        Ok(())
    }

    /// Commit to `peer` and mark the session connected
    pub fn establish(&mut self, peer: SocketAddr) -> Result<()> {
        self.ensure_not_connected()?;
        self.state = HandshakeState::Established;
        self.committed_peer = Some(peer);
        info!(%peer, "Session established");
        Ok(())
    }

    /// Abandon an unfinished handshake. Has no effect on an established session.
    pub fn reset_handshake(&mut self) {
        if !self.is_connected() {
            self.state = HandshakeState::Idle;
        }
    }

    /// Leave the established state, returning the peer that was committed
    pub fn close(&mut self) -> Option<SocketAddr> {
        let peer = self.committed_peer()?;
        self.state = HandshakeState::Idle;
        Some(peer)
    }

    /// Inspect a received datagram; a disconnection from the committed peer
    /// closes the session. Returns true if it did.
    pub fn observe(&mut self, datagram: &RawDatagram) -> bool {
        if self.committed_peer() != Some(datagram.peer)
            || !handshake::is_disconnection_datagram(&datagram.payload)
        {
            return false;
        }

        self.state = HandshakeState::Idle;
        global_metrics().disconnection();
        info!(peer = %datagram.peer, "Peer disconnected");
        true
    }

    fn ensure_not_connected(&self) -> Result<()> {
        if self.is_connected() {
            Err(ProtocolError::AlreadyConnected)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::codec::TaggedCodec;
    use crate::core::fragment::fragment_value;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn disconnect_from(peer: SocketAddr) -> RawDatagram {
        let mut codec = TaggedCodec::default();
        let datagrams = fragment_value(&handshake::disconnection(), &mut codec).unwrap();
        RawDatagram::new(peer, datagrams[0].clone())
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new();
        assert_eq!(session.state(), HandshakeState::Idle);
        assert!(!session.is_connected());
        assert_eq!(session.committed_peer(), None);
    }

    #[test]
    fn test_client_path() {
        let mut session = Session::new();
        session.begin_client_handshake().unwrap();
        assert_eq!(session.state(), HandshakeState::AwaitingReply);
        session.establish(addr(5000)).unwrap();
        assert_eq!(session.committed_peer(), Some(addr(5000)));
    }

    #[test]
    fn test_failed_handshake_returns_to_idle() {
        let mut session = Session::new();
        session.begin_client_handshake().unwrap();
        session.reset_handshake();
        assert_eq!(session.state(), HandshakeState::Idle);
    }

    #[test]
    fn test_committed_peer_is_stable_while_connected() {
        let mut session = Session::new();
        session.establish(addr(5000)).unwrap();
        assert!(matches!(
            session.establish(addr(6000)),
            Err(ProtocolError::AlreadyConnected)
        ));
        assert!(session.begin_client_handshake().is_err());
        session.reset_handshake();
        assert_eq!(session.committed_peer(), Some(addr(5000)));
    }

    #[test]
    fn test_disconnection_only_counts_from_committed_peer() {
        let mut session = Session::new();
        session.establish(addr(5000)).unwrap();

        assert!(!session.observe(&disconnect_from(addr(5001))));
        assert!(session.is_connected());

        assert!(session.observe(&disconnect_from(addr(5000))));
        assert!(!session.is_connected());
        assert_eq!(session.committed_peer(), None);
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let mut session = Session::new();
        session.establish(addr(5000)).unwrap();
        assert_eq!(session.close(), Some(addr(5000)));
        assert_eq!(session.close(), None);
        session.establish(addr(7000)).unwrap();
        assert_eq!(session.committed_peer(), Some(addr(7000)));
    }
}
