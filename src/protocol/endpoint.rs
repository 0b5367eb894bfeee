//! # Endpoint
//!
//! One protocol instance: a bound datagram socket, its peer demultiplexer, the
//! session state and the codec. All operations take `&mut self`; an endpoint
//! serves one conversation at a time and concurrency comes from running many
//! endpoints, one per task.
//!
//! ## Client
//! ```no_run
//! use std::time::Duration;
//! use udp_session::Endpoint;
//!
//! # async fn run() -> udp_session::Result<()> {
//! let mut endpoint = Endpoint::bind("0.0.0.0:0").await?;
//! endpoint.connect_to_server("localhost", 9876).await?;
//! endpoint.send("hello").await?;
//! let reply = endpoint.receive_string(Some(Duration::from_secs(1))).await?;
//! println!("{reply}");
//! endpoint.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The socket is closed when the endpoint is dropped. A still connected
//! endpoint makes a best-effort attempt to tell its peer first.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{lookup_host, ToSocketAddrs};
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientConfig, NetworkConfig, TransportConfig};
use crate::core::codec::{decode_tagged, peek_tag, TaggedCodec};
use crate::core::fragment::{fragment_payload, fragment_value, Reassembly};
use crate::core::value::{TypeTag, Value};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake;
use crate::protocol::session::{HandshakeState, Session};
use crate::transport::datagram::{DatagramSocket, RawDatagram};
use crate::transport::demux::PeerDemux;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout;

#[derive(Debug)]
pub struct Endpoint {
    demux: PeerDemux,
    session: Session,
    codec: TaggedCodec,
    fragment_timeout: Duration,
    connection_timeout: Duration,
}

impl Endpoint {
    /// Bind a new endpoint with default transport settings
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::bind_with_config(addr, &TransportConfig::default()).await
    }

    /// Bind on all IPv4 interfaces at `port` (0 for an ephemeral port)
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(("0.0.0.0", port)).await
    }

    pub async fn bind_with_config<A: ToSocketAddrs>(
        addr: A,
        config: &TransportConfig,
    ) -> Result<Self> {
        let socket = DatagramSocket::bind(addr).await?;
        debug!(local = %socket.local_addr(), "Endpoint bound");
        Ok(Self {
            demux: PeerDemux::new(socket, config.pending_queue_capacity),
            session: Session::new(),
            codec: TaggedCodec::new(config.max_message_size),
            fragment_timeout: config.fragment_timeout,
            connection_timeout: timeout::HANDSHAKE_TIMEOUT,
        })
    }

    /// Bind with the transport settings of `config` and its client handshake timeout
    pub async fn bind_with_network_config<A: ToSocketAddrs>(
        addr: A,
        config: &NetworkConfig,
    ) -> Result<Self> {
        Ok(Self::bind_with_config(addr, &config.transport)
            .await?
            .with_connection_timeout(config.client.connection_timeout))
    }

    /// Set how long a client handshake waits for the echo
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set how long reassembly waits for each continuation datagram
    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.demux.socket().local_addr()
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr().port()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Peer this endpoint is connected to, if any
    pub fn committed_peer(&self) -> Option<SocketAddr> {
        self.session.committed_peer()
    }

    /// Sender of the most recently received datagram
    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.demux.last_peer()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> HandshakeState {
        self.session.state()
    }

    /// Datagrams parked for peers nobody has asked for yet
    pub fn pending_len(&self) -> usize {
        self.demux.pending().len()
    }

    /// Resolve `host:port` to an address of the same family as the local socket.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let want_ipv4 = self.local_addr().is_ipv4();
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|e| ProtocolError::AddressResolution(format!("{host}: {e}")))?;

        addrs.find(|addr| addr.is_ipv4() == want_ipv4).ok_or_else(|| {
            ProtocolError::AddressResolution(format!(
                "{}: {host}",
                constants::ERR_NO_SUITABLE_ADDRESS
            ))
        })
    }

    /// Connect to a server by host name.
    ///
    /// Resolution failures are reported before anything is sent.
    #[instrument(skip(self))]
    pub async fn connect_to_server(&mut self, host: &str, port: u16) -> Result<SocketAddr> {
        let server = self.resolve(host, port).await?;
        self.connect_to_addr(server).await
    }

    /// Connect to the server named by `client.address`, waiting at most
    /// `client.connection_timeout` for the echo.
    pub async fn connect(&mut self, client: &ClientConfig) -> Result<SocketAddr> {
        let (host, port) = client.host_and_port()?;
        self.connection_timeout = client.connection_timeout;
        self.connect_to_server(host, port).await
    }

    /// Run the client handshake against `server`.
    ///
    /// Sends the connection request, then waits up to the connection timeout
    /// for an echo from exactly `server`. Anything else is discarded. On
    /// success the session is committed to the server's address at the echoed
    /// port, which is returned.
    #[instrument(skip(self), fields(local = %self.local_addr()))]
    pub async fn connect_to_addr(&mut self, server: SocketAddr) -> Result<SocketAddr> {
        self.session.begin_client_handshake()?;
        global_metrics().handshake_attempt();

        let deadline = timeout::deadline(Some(self.connection_timeout));
        let outcome = match self.send_to(server, handshake::connection_request()).await {
            Ok(()) => self.await_echo(server, deadline).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(port) => {
                let peer = SocketAddr::new(server.ip(), port);
                self.session.establish(peer)?;
                global_metrics().handshake_success();
                Ok(peer)
            }
            Err(e) => {
                self.session.reset_handshake();
                global_metrics().handshake_failed();
                warn!(%server, error = %e, "Connection attempt failed");
                Err(e)
            }
        }
    }

    async fn await_echo(
        &mut self,
        server: SocketAddr,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<u16> {
        loop {
            let datagram =
                timeout::until(deadline, self.demux.receive_any(&mut self.session, None)).await?;

            if datagram.peer != server {
                debug!(from = %datagram.peer, "Discarding datagram from unexpected peer");
                continue;
            }
            let echo = handshake::single_datagram_text(&datagram.payload)
                .and_then(handshake::parse_connection_echo);
            match echo {
                Some(port) => return port,
                None => debug!("Discarding non-echo datagram from server"),
            }
        }
    }

    /// Commit to a peer whose address is already known, skipping the handshake
    pub fn connect_to_peer(&mut self, peer: SocketAddr) -> Result<()> {
        self.session.establish(peer)
    }

    /// Wait, without a timeout, for a connection request and answer it.
    ///
    /// The echo tells the client to continue on `port`, which the caller is
    /// expected to have bound already. Returns the requesting peer. This
    /// endpoint's own session is left idle.
    #[instrument(skip(self), fields(local = %self.local_addr()))]
    pub async fn wait_client(&mut self, port: u16) -> Result<SocketAddr> {
        self.session.begin_server_handshake()?;

        let result = match self.await_request().await {
            Ok(peer) => {
                global_metrics().handshake_attempt();
                self.send_to(peer, handshake::connection_echo(port))
                    .await
                    .map(|()| peer)
            }
            Err(e) => Err(e),
        };
        self.session.reset_handshake();

        match &result {
            Ok(peer) => {
                global_metrics().handshake_success();
                info!(%peer, session_port = port, "Answered connection request");
            }
            Err(e) => {
                global_metrics().handshake_failed();
                warn!(error = %e, "Failed to answer connection request");
            }
        }
        result
    }

    async fn await_request(&mut self) -> Result<SocketAddr> {
        loop {
            let datagram = self.demux.receive_any(&mut self.session, None).await?;
            if handshake::single_datagram_text(&datagram.payload)
                .is_some_and(handshake::is_connection_request)
            {
                return Ok(datagram.peer);
            }
            debug!(from = %datagram.peer, "Discarding datagram while awaiting a request");
        }
    }

    /// Tell the committed peer the session is over and mark it closed.
    ///
    /// The session is closed even if the notification could not be sent.
    /// Does nothing when not connected.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(peer) = self.session.committed_peer() else {
            return Ok(());
        };
        let sent = self.send_to(peer, handshake::disconnection()).await;
        self.session.close();
        global_metrics().disconnection();
        info!(%peer, "Disconnected");
        sent
    }

    /// True if `value` is the disconnection sentinel
    pub fn is_disconnection(value: &Value) -> bool {
        value.as_str().is_some_and(handshake::is_disconnection)
    }

    /// Send one raw, unframed datagram
    pub async fn send_datagram(&self, peer: SocketAddr, payload: &[u8]) -> Result<()> {
        self.demux.socket().send_to(payload, peer).await
    }

    /// Frame and send an already tagged payload, fragmenting as needed
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn send_tagged(&self, peer: SocketAddr, payload: &[u8]) -> Result<()> {
        let datagrams = fragment_payload(payload, &self.codec)?;
        self.send_datagrams(peer, datagrams).await
    }

    /// Encode and send a value to `peer`
    #[instrument(skip(self, value))]
    pub async fn send_to(&mut self, peer: SocketAddr, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let datagrams = fragment_value(&value, &mut self.codec)?;
        debug!(tag = %value.tag(), datagrams = datagrams.len(), "Sending value");
        self.send_datagrams(peer, datagrams).await
    }

    /// Resolve `host` and send a value to it
    pub async fn send_to_host(
        &mut self,
        host: &str,
        port: u16,
        value: impl Into<Value>,
    ) -> Result<()> {
        let peer = self.resolve(host, port).await?;
        self.send_to(peer, value).await
    }

    /// Send a value to the committed peer
    pub async fn send(&mut self, value: impl Into<Value>) -> Result<()> {
        let peer = self
            .session
            .committed_peer()
            .ok_or(ProtocolError::NotConnected)?;
        self.send_to(peer, value).await
    }

    async fn send_datagrams(&self, peer: SocketAddr, datagrams: Vec<Bytes>) -> Result<()> {
        let count = datagrams.len();
        for datagram in &datagrams {
            self.demux.socket().send_to(datagram, peer).await?;
        }
        global_metrics().message_sent(count);
        Ok(())
    }

    /// Next raw datagram from anyone
    pub async fn receive_datagram(&mut self, timeout: Option<Duration>) -> Result<RawDatagram> {
        self.demux.receive_any(&mut self.session, timeout).await
    }

    /// Next raw datagram from `peer`; traffic from others is kept for later
    pub async fn receive_datagram_from(
        &mut self,
        peer: SocketAddr,
        timeout: Option<Duration>,
    ) -> Result<RawDatagram> {
        self.demux.receive_from(&mut self.session, peer, timeout).await
    }

    /// Receive one whole tagged payload and the peer that sent it.
    ///
    /// `timeout` bounds the wait for the first datagram. Each continuation must
    /// then arrive from the same peer within the fragment timeout, otherwise
    /// the message is dropped with [`ProtocolError::MissingFragment`].
    #[instrument(skip(self))]
    pub async fn receive_tagged(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(SocketAddr, Bytes)> {
        let first = self.demux.receive_any(&mut self.session, timeout).await?;
        let peer = first.peer;
        let mut reassembly =
            Reassembly::begin(peer, &first.payload, &self.codec).map_err(wire_error)?;

        while !reassembly.is_complete() {
            match self
                .demux
                .receive_from(&mut self.session, peer, Some(self.fragment_timeout))
                .await
            {
                Ok(continuation) => reassembly.push(&continuation.payload).map_err(wire_error)?,
                Err(e) if e.is_timeout() => {
                    global_metrics().missing_fragment();
                    warn!(
                        %peer,
                        received = reassembly.received(),
                        expected = reassembly.expected(),
                        "Fragment did not arrive, dropping message"
                    );
                    return Err(reassembly.missing());
                }
                Err(e) => return Err(e),
            }
        }

        let payload = reassembly.into_payload()?;
        global_metrics().message_received();
        debug!(%peer, len = payload.len(), "Message reassembled");
        Ok((peer, payload))
    }

    /// Receive and decode the next value of any type
    pub async fn receive(&mut self, timeout: Option<Duration>) -> Result<Value> {
        let (_, payload) = self.receive_tagged(timeout).await?;
        decode_tagged(&payload).map_err(wire_error)
    }

    /// Receive the next message, requiring it to carry `expected`.
    ///
    /// A message of another type is consumed and reported as a mismatch.
    async fn receive_of(&mut self, expected: TypeTag, timeout: Option<Duration>) -> Result<Value> {
        let (peer, payload) = self.receive_tagged(timeout).await?;
        let found = peek_tag(&payload).map_err(wire_error)?;
        if found != expected {
            global_metrics().protocol_error();
            debug!(%peer, %expected, %found, "Type mismatch");
            return Err(ProtocolError::TypeMismatch { expected, found });
        }
        decode_tagged(&payload).map_err(wire_error)
    }

    pub async fn receive_bytes(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        match self.receive_of(TypeTag::Bytes, timeout).await? {
            Value::Bytes(v) => Ok(v),
            other => Err(mismatch(TypeTag::Bytes, &other)),
        }
    }

    pub async fn receive_string(&mut self, timeout: Option<Duration>) -> Result<String> {
        match self.receive_of(TypeTag::String, timeout).await? {
            Value::String(v) => Ok(v),
            other => Err(mismatch(TypeTag::String, &other)),
        }
    }

    pub async fn receive_int(&mut self, timeout: Option<Duration>) -> Result<i32> {
        match self.receive_of(TypeTag::Int, timeout).await? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(TypeTag::Int, &other)),
        }
    }

    pub async fn receive_bool(&mut self, timeout: Option<Duration>) -> Result<bool> {
        match self.receive_of(TypeTag::Bool, timeout).await? {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch(TypeTag::Bool, &other)),
        }
    }

    pub async fn receive_double(&mut self, timeout: Option<Duration>) -> Result<f64> {
        match self.receive_of(TypeTag::Double, timeout).await? {
            Value::Double(v) => Ok(v),
            other => Err(mismatch(TypeTag::Double, &other)),
        }
    }

    pub async fn receive_int_array(&mut self, timeout: Option<Duration>) -> Result<Vec<i32>> {
        match self.receive_of(TypeTag::IntArray, timeout).await? {
            Value::IntArray(v) => Ok(v),
            other => Err(mismatch(TypeTag::IntArray, &other)),
        }
    }

    pub async fn receive_bool_array(&mut self, timeout: Option<Duration>) -> Result<Vec<bool>> {
        match self.receive_of(TypeTag::BoolArray, timeout).await? {
            Value::BoolArray(v) => Ok(v),
            other => Err(mismatch(TypeTag::BoolArray, &other)),
        }
    }

    pub async fn receive_double_array(&mut self, timeout: Option<Duration>) -> Result<Vec<f64>> {
        match self.receive_of(TypeTag::DoubleArray, timeout).await? {
            Value::DoubleArray(v) => Ok(v),
            other => Err(mismatch(TypeTag::DoubleArray, &other)),
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let Some(peer) = self.session.committed_peer() else {
            return;
        };
        let Ok(datagrams) = fragment_value(&handshake::disconnection(), &mut self.codec) else {
            return;
        };
        for datagram in &datagrams {
            if let Err(e) = self.demux.socket().try_send_to(datagram, peer) {
                debug!(%peer, error = %e, "Could not notify peer on drop");
                return;
            }
        }
        global_metrics().disconnection();
    }
}

fn wire_error(e: ProtocolError) -> ProtocolError {
    if e.is_wire_error() {
        global_metrics().protocol_error();
        warn!(error = %e, "Discarding unreadable message");
    }
    e
}

fn mismatch(expected: TypeTag, found: &Value) -> ProtocolError {
    ProtocolError::TypeMismatch {
        expected,
        found: found.tag(),
    }
}
