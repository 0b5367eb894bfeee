//! # Protocol Layer
//!
//! Connection semantics on top of the datagram transport.
//!
//! ## Components
//! - **Handshake**: request, echo and disconnection literals
//! - **Session**: handshake state and the committed peer
//! - **Endpoint**: one protocol instance driving handshakes, typed sends and
//!   reassembling receives over its own socket
//!
//! ## Handshake
//! ```text
//! client                      server :9876             worker :N
//!   │── connectionRequest ──────▶│
//!   │◀── connectionEcho + N ─────│
//!   │── messages ───────────────────────────────────────▶│
//!   │── disconnection ──────────────────────────────────▶│
//! ```

pub mod endpoint;
pub mod handshake;
pub mod session;

#[cfg(test)]
mod tests;
