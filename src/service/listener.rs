//! Session listener.
//!
//! Accepts handshakes on the well-known address and hands each client its own
//! [`Endpoint`] on a separate port. [`SessionListener::run`] drives one worker
//! task per session under a `JoinSet` and stops through a shutdown channel,
//! giving live sessions a grace period before aborting them.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::config::{NetworkConfig, TransportConfig};
use crate::error::{ProtocolError, Result};
use crate::protocol::endpoint::Endpoint;
use crate::utils::metrics::global_metrics;

pub struct SessionListener {
    endpoint: Endpoint,
    transport: TransportConfig,
    port_start: u16,
    next_port: u16,
    max_sessions: usize,
    shutdown_timeout: Duration,
}

impl SessionListener {
    /// Bind the handshake socket at `config.server.address`
    pub async fn bind(config: &NetworkConfig) -> Result<Self> {
        let address: SocketAddr = config.server.address.parse().map_err(|_| {
            ProtocolError::ConfigError(format!(
                "Invalid server address: {}",
                config.server.address
            ))
        })?;
        let endpoint = Endpoint::bind_with_config(address, &config.transport).await?;
        info!(address = %endpoint.local_addr(), "Listening for connection requests");

        Ok(Self {
            endpoint,
            transport: config.transport.clone(),
            port_start: config.server.session_port_start,
            next_port: config.server.session_port_start,
            max_sessions: config.server.max_sessions.max(1),
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Wait for the next client and return an endpoint already connected to it.
    ///
    /// The session socket is bound before the echo announces its port.
    #[instrument(skip(self), fields(listener = %self.local_addr()))]
    pub async fn accept(&mut self) -> Result<Endpoint> {
        let mut worker = self.bind_session_socket().await?;
        let client = self.endpoint.wait_client(worker.local_port()).await?;
        worker.connect_to_peer(client)?;
        Ok(worker)
    }

    async fn bind_session_socket(&mut self) -> Result<Endpoint> {
        let ip = self.local_addr().ip();
        if self.port_start == 0 {
            return self.bind_session_port(ip, 0).await;
        }

        for _ in 0..self.max_sessions {
            let port = self.next_port;
            self.advance_port();
            match self.bind_session_port(ip, port).await {
                Err(ProtocolError::Io(e)) if e.kind() == io::ErrorKind::AddrInUse => {
                    debug!(port, "Session port busy, trying the next one");
                }
                other => return other,
            }
        }

        Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::AddrInUse,
            "no free port in the session range",
        )))
    }

    async fn bind_session_port(&self, ip: IpAddr, port: u16) -> Result<Endpoint> {
        Endpoint::bind_with_config(SocketAddr::new(ip, port), &self.transport).await
    }

    fn advance_port(&mut self) {
        let end = usize::from(self.port_start) + self.max_sessions;
        self.next_port = match self.next_port.checked_add(1) {
            Some(port) if usize::from(port) < end => port,
            _ => self.port_start,
        };
    }

    /// Serve sessions until `shutdown_rx` fires.
    ///
    /// Each accepted endpoint is handed to `handler` in its own task. At most
    /// `max_sessions` run at once; further clients wait until one finishes.
    pub async fn run<F, Fut>(mut self, handler: F, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()>
    where
        F: Fn(Endpoint) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut sessions = JoinSet::new();

        loop {
            while let Some(finished) = sessions.try_join_next() {
                log_session_end(finished);
            }

            if sessions.len() >= self.max_sessions {
                debug!(active = sessions.len(), "Session limit reached");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    Some(finished) = sessions.join_next() => {
                        log_session_end(finished);
                        continue;
                    }
                }
            }

            // Keep reaping while a client is awaited; the accept is never dropped
            let accept = self.accept();
            tokio::pin!(accept);
            let accepted = loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break None,
                    accepted = &mut accept => break Some(accepted),
                    Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                        log_session_end(finished);
                    }
                }
            };

            match accepted {
                None => break,
                Some(Ok(endpoint)) => {
                    let peer = endpoint
                        .committed_peer()
                        .map(|p| p.to_string())
                        .unwrap_or_default();
                    let span = info_span!("session", %peer, port = endpoint.local_port());
                    let handler = handler.clone();
                    sessions.spawn(
                        async move {
                            let _guard = SessionGuard::start();
                            handler(endpoint).await
                        }
                        .instrument(span),
                    );
                }
                Some(Err(e)) => error!(error = %e, "Failed to accept session"),
            }
        }

        info!(active = sessions.len(), "Shutting down listener. Waiting for sessions to close...");
        let grace = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                _ = &mut grace => {
                    warn!(remaining = sessions.len(), "Shutdown timeout reached, aborting sessions");
                    sessions.abort_all();
                    break;
                }
                finished = sessions.join_next() => match finished {
                    Some(finished) => log_session_end(finished),
                    None => {
                        info!("All sessions closed");
                        break;
                    }
                }
            }
        }

        while sessions.join_next().await.is_some() {}
        global_metrics().log_metrics();
        Ok(())
    }

    /// Serve sessions until CTRL+C
    pub async fn run_until_ctrl_c<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(Endpoint) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run(handler, shutdown_rx).await
    }
}

/// Keeps the active-session gauge right even when a task is aborted
struct SessionGuard;

impl SessionGuard {
    fn start() -> Self {
        global_metrics().session_started();
        SessionGuard
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        global_metrics().session_finished();
    }
}

fn log_session_end(result: std::result::Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => debug!("Session finished"),
        Ok(Err(e)) => {
            global_metrics().session_failed();
            warn!(error = %e, "Session ended with an error");
        }
        Err(e) if e.is_cancelled() => debug!("Session aborted"),
        Err(e) => {
            global_metrics().session_failed();
            error!(error = %e, "Session task panicked");
        }
    }
}
