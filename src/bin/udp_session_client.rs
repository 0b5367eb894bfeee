//! Demo session client
//!
//! Connects to a session server, sends one message, prints the reply and
//! disconnects.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};

use udp_session::utils::logging::init_logging;
use udp_session::{Endpoint, NetworkConfig, Result};

/// UDP session client
#[derive(Parser, Debug)]
#[command(name = "udp-session-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host name or address, overrides the configuration
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server handshake port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Message to send
    #[arg(short, long, default_value = "Hello")]
    message: String,

    /// How long to wait for the handshake and the reply, in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

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
    if args.host.is_some() || args.port.is_some() {
        let (host, port) = config.client.host_and_port()?;
        let host = args.host.as_deref().unwrap_or(host);
        let port = args.port.unwrap_or(port);
        let address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        config.client.address = address;
    }
    if let Some(millis) = args.timeout {
        config.client.connection_timeout = Duration::from_millis(millis);
    }
    config.logging.app_name = String::from("udp-session-client");
    if args.verbose {
        config.logging.log_level = Level::DEBUG;
    }

    init_logging(&config.logging);
    config.validate_strict()?;

    let mut endpoint = Endpoint::bind_with_network_config("0.0.0.0:0", &config).await?;
    let session = endpoint.connect(&config.client).await?;
    info!(%session, "Connected");

    endpoint.send(args.message).await?;
    let response = endpoint
        .receive_string(Some(config.client.connection_timeout))
        .await?;
    println!("Server sent : {response}");

    endpoint.disconnect().await
}
