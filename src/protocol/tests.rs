// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ProtocolError;
use crate::protocol::endpoint::Endpoint;
use crate::protocol::handshake::*;
use crate::protocol::session::HandshakeState;

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

async fn loopback() -> Endpoint {
    Endpoint::bind("127.0.0.1:0")
        .await
        .expect("Bind should succeed")
}

#[tokio::test]
async fn test_handshake_flow() {
    let mut listener = loopback().await;
    let mut worker = loopback().await;
    let mut client = loopback().await.with_connection_timeout(Duration::from_secs(2));

    let listener_addr = listener.local_addr();
    let worker_port = worker.local_port();

    // =================== Step 1: Server waits, client requests ===================
    let server = tokio::spawn(async move {
        let peer = listener.wait_client(worker_port).await?;
        Ok::<_, ProtocolError>((listener, peer))
    });

    let committed = client
        .connect_to_addr(listener_addr)
        .await
        .expect("Client handshake should succeed");

    // =================== Step 2: Echo redirects to the worker ===================
    let (listener, client_addr) = server.await.unwrap().expect("Server side should succeed");
    assert_eq!(client_addr, client.local_addr());
    assert_eq!(committed.port(), worker_port);
    assert_eq!(client.committed_peer(), Some(committed));
    assert_eq!(listener.state(), HandshakeState::Idle);
    assert!(!listener.is_connected());

    // =================== Step 3: Worker adopts the client ===================
    worker.connect_to_peer(client_addr).unwrap();
    client.send("ping").await.unwrap();
    assert_eq!(worker.receive_string(WAIT).await.unwrap(), "ping");
    worker.send("pong").await.unwrap();
    assert_eq!(client.receive_string(WAIT).await.unwrap(), "pong");

    // =================== Step 4: Client leaves ===================
    client.disconnect().await.unwrap();
    assert!(!client.is_connected());

    let bye = worker.receive(WAIT).await.unwrap();
    assert!(Endpoint::is_disconnection(&bye));
    assert!(!worker.is_connected());
}

#[tokio::test]
async fn test_client_ignores_echo_from_other_peer() {
    let mut client = loopback().await.with_connection_timeout(Duration::from_millis(200));
    let server = loopback().await;
    let mut impostor = loopback().await;

    let client_addr = client.local_addr();
    let server_addr = server.local_addr();
    let spoof = tokio::spawn(async move {
        impostor
            .send_to(client_addr, connection_echo(4242))
            .await
            .unwrap();
    });

    let err = client.connect_to_addr(server_addr).await.unwrap_err();
    spoof.await.unwrap();
    assert!(err.is_timeout());
    assert!(!client.is_connected());
    assert_eq!(client.state(), HandshakeState::Idle);
}

#[tokio::test]
async fn test_invalid_echo_port_fails_handshake() {
    let mut client = loopback().await.with_connection_timeout(Duration::from_secs(2));
    let mut server = loopback().await;

    let server_addr = server.local_addr();
    let reply = tokio::spawn(async move {
        let request = server.receive_datagram(WAIT).await.unwrap();
        let echo = format!("{CONNECTION_ECHO}99999");
        server.send_to(request.peer, echo.as_str()).await.unwrap();
    });

    let err = client.connect_to_addr(server_addr).await.unwrap_err();
    reply.await.unwrap();
    assert!(matches!(err, ProtocolError::HandshakeError(_)));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_echo_port_zero_fails_handshake() {
    let mut client = loopback().await.with_connection_timeout(Duration::from_secs(2));
    let mut server = loopback().await;

    let server_addr = server.local_addr();
    let reply = tokio::spawn(async move {
        let request = server.receive_datagram(WAIT).await.unwrap();
        server.send_to(request.peer, connection_echo(0)).await.unwrap();
    });

    let err = client.connect_to_addr(server_addr).await.unwrap_err();
    reply.await.unwrap();
    assert!(matches!(err, ProtocolError::HandshakeError(_)));
    assert_eq!(client.committed_peer(), None);
}

#[tokio::test]
async fn test_wait_client_skips_non_requests() {
    let mut listener = loopback().await;
    let mut noisy = loopback().await;
    let mut client = loopback().await;
    let to = listener.local_addr();

    noisy.send_to(to, "hello").await.unwrap();
    noisy.send_to(to, format!("{CONNECTION_REQUEST} ")).await.unwrap();
    client.send_to(to, connection_request()).await.unwrap();

    let peer = listener.wait_client(5555).await.unwrap();
    assert_eq!(peer, client.local_addr());

    let echo = client.receive_string(WAIT).await.unwrap();
    assert_eq!(parse_connection_echo(&echo).unwrap().unwrap(), 5555);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let mut endpoint = loopback().await;
    let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    endpoint.connect_to_peer(peer).unwrap();

    let err = endpoint.connect_to_addr(peer).await.unwrap_err();
    assert!(matches!(err, ProtocolError::AlreadyConnected));
    assert_eq!(endpoint.committed_peer(), Some(peer));
}

#[tokio::test]
async fn test_send_requires_connection() {
    let mut endpoint = loopback().await;
    let err = endpoint.send(1).await.unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));

    // Disconnecting an idle endpoint is a no-op
    endpoint.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_drop_notifies_committed_peer() {
    let mut watcher = loopback().await;
    let mut leaving = loopback().await;

    watcher.connect_to_peer(leaving.local_addr()).unwrap();
    leaving.connect_to_peer(watcher.local_addr()).unwrap();
    leaving.send("last words").await.unwrap();
    drop(leaving);

    assert_eq!(watcher.receive_string(WAIT).await.unwrap(), "last words");
    let bye = watcher.receive(WAIT).await.unwrap();
    assert!(Endpoint::is_disconnection(&bye));
    assert!(!watcher.is_connected());
}
