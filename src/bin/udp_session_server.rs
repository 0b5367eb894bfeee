//! Demo session server
//!
//! Answers connection requests on the handshake port and serves each client
//! from its own socket, replying "Received" to every string until the client
//! disconnects.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn, Level};

use udp_session::protocol::handshake;
use udp_session::utils::logging::init_logging;
use udp_session::{Endpoint, NetworkConfig, ProtocolError, Result, SessionListener};

/// UDP session server
#[derive(Parser, Debug)]
#[command(name = "udp-session-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Handshake address, overrides the configuration
    #[arg(short, long)]
    address: Option<String>,

    /// First port handed to sessions (0 lets the OS choose)
    #[arg(long)]
    port_start: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::from_env()?,
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(port) = args.port_start {
        config.server.session_port_start = port;
    }
    if args.verbose {
        config.logging.log_level = Level::DEBUG;
    }

    init_logging(&config.logging);
    config.validate_strict()?;

    let listener = SessionListener::bind(&config).await?;
    info!("Starting session server");
    info!("  Handshake address: {}", listener.local_addr());
    info!("  First session port: {}", config.server.session_port_start);
    info!("  Max sessions: {}", config.server.max_sessions);

    listener.run_until_ctrl_c(serve_client).await
}

async fn serve_client(mut session: Endpoint) -> Result<()> {
    info!("New client");

    loop {
        let message = match session.receive_string(None).await {
            Ok(message) => message,
            Err(e @ ProtocolError::TypeMismatch { .. }) => {
                warn!(error = %e, "Ignoring non-string message");
                continue;
            }
            Err(e) if e.is_wire_error() => continue,
            Err(e) => return Err(e),
        };

        if handshake::is_disconnection(&message) || !session.is_connected() {
            break;
        }

        info!(%message, "Client sent");
        session.send("Received").await?;
    }

    info!("Client disconnected");
    Ok(())
}
