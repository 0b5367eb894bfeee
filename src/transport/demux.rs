//! Peer demultiplexer.
//!
//! Lets a caller wait for datagrams from one specific peer without losing the
//! traffic other peers send meanwhile. Datagrams from anyone else are parked in
//! a [`PendingQueue`] and replayed, oldest first, before the socket is read
//! again.
//!
//! Every datagram is shown to the [`Session`] the moment it is read from the
//! socket, parked or not, which is how a disconnection from the committed peer
//! takes effect as a side effect of receiving. Replaying a parked datagram
//! does not show it again.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::protocol::session::Session;
use crate::transport::datagram::{DatagramSocket, RawDatagram};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout;

/// Bounded FIFO of datagrams received while waiting on another peer.
///
/// When full, the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<RawDatagram>,
    capacity: usize,
}

impl PendingQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Park a datagram, returning the one evicted to make room, if any
    pub fn push(&mut self, datagram: RawDatagram) -> Option<RawDatagram> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(datagram);
        evicted
    }

    /// Oldest parked datagram from anyone
    pub fn pop_oldest(&mut self) -> Option<RawDatagram> {
        self.entries.pop_front()
    }

    /// Oldest parked datagram from `peer`
    pub fn take_from(&mut self, peer: SocketAddr) -> Option<RawDatagram> {
        let index = self.entries.iter().position(|d| d.peer == peer)?;
        self.entries.remove(index)
    }

    /// Parked datagrams in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &RawDatagram> {
        self.entries.iter()
    }
}

/// Socket plus pending queue; the only reader of its socket.
#[derive(Debug)]
pub struct PeerDemux {
    socket: DatagramSocket,
    pending: PendingQueue,
    last_peer: Option<SocketAddr>,
}

impl PeerDemux {
    pub fn new(socket: DatagramSocket, pending_capacity: usize) -> Self {
        Self {
            socket,
            pending: PendingQueue::with_capacity(pending_capacity),
            last_peer: None,
        }
    }

    pub fn socket(&self) -> &DatagramSocket {
        &self.socket
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Sender of the most recently delivered datagram
    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    /// Next datagram from anyone: the oldest parked one, else a fresh read.
    #[instrument(level = "trace", skip(self, session))]
    pub async fn receive_any(
        &mut self,
        session: &mut Session,
        timeout: Option<Duration>,
    ) -> Result<RawDatagram> {
        let datagram = match self.pending.pop_oldest() {
            Some(parked) => parked,
            None => {
                let fresh = self.socket.recv(timeout).await?;
                session.observe(&fresh);
                fresh
            }
        };
        Ok(self.deliver(datagram))
    }

    /// Next datagram from `peer`, parking everything else that arrives first.
    ///
    /// `timeout` bounds the whole wait, not each individual read. Oversized
    /// datagrams read meanwhile are dropped and the wait goes on.
    #[instrument(level = "trace", skip(self, session))]
    pub async fn receive_from(
        &mut self,
        session: &mut Session,
        peer: SocketAddr,
        timeout: Option<Duration>,
    ) -> Result<RawDatagram> {
        if let Some(parked) = self.pending.take_from(peer) {
            return Ok(self.deliver(parked));
        }

        let deadline = timeout::deadline(timeout);
        let socket = &self.socket;
        let pending = &mut self.pending;
        let datagram = timeout::until(deadline, async move {
            loop {
                let datagram = match socket.recv(None).await {
                    Ok(datagram) => datagram,
                    Err(e) if e.is_wire_error() => continue,
                    Err(e) => return Err(e),
                };
                session.observe(&datagram);
                if datagram.peer == peer {
                    return Ok(datagram);
                }
                debug!(from = %datagram.peer, waiting_on = %peer, "Parking datagram from another peer");
                global_metrics().pending_queued();
                if let Some(evicted) = pending.push(datagram) {
                    global_metrics().pending_evicted();
                    warn!(
                        from = %evicted.peer,
                        bytes = evicted.payload.len(),
                        "Pending queue full, dropped oldest datagram"
                    );
                }
            }
        })
        .await?;

        Ok(self.deliver(datagram))
    }

    fn deliver(&mut self, datagram: RawDatagram) -> RawDatagram {
        self.last_peer = Some(datagram.peer);
        datagram
    }
}
