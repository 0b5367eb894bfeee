//! # udp-session
//!
//! Connection-oriented, typed messaging over unreliable UDP datagrams.
//!
//! A client sends a connection request to a server's well-known port; the
//! server answers with the port of a socket dedicated to that client, and the
//! conversation continues there. Values (bytes, strings, integers, booleans,
//! doubles and arrays of them) are tagged, length-prefixed and split into
//! datagrams of at most 1024 bytes. The receiver reassembles them from the
//! sending peer only, parking unrelated traffic until someone asks for it.
//!
//! There is no retransmission, acknowledgment or checksum: a lost continuation
//! datagram fails the whole message.
//!
//! ## Quick Start
//! ```no_run
//! use udp_session::{Endpoint, NetworkConfig, SessionListener};
//!
//! # async fn run() -> udp_session::Result<()> {
//! let listener = SessionListener::bind(&NetworkConfig::default()).await?;
//! listener
//!     .run_until_ctrl_c(|mut session: Endpoint| async move {
//!         while let Ok(text) = session.receive_string(None).await {
//!             if !session.is_connected() {
//!                 break;
//!             }
//!             session.send(format!("echo: {text}")).await?;
//!         }
//!         Ok::<_, udp_session::ProtocolError>(())
//!     })
//!     .await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use crate::core::value::{TypeTag, Value};
pub use error::{ProtocolError, Result};
pub use protocol::endpoint::Endpoint;
pub use protocol::session::HandshakeState;
pub use service::listener::SessionListener;
