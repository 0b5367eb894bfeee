//! # Core Protocol Components
//!
//! Typed values, their binary encodings, and message framing.
//!
//! ## Components
//! - **Value**: the closed set of types the protocol carries and their tag bytes
//! - **Codec**: fixed-width big-endian encodings and a tokio-util codec for
//!   length-prefixed tagged frames
//! - **Fragment**: splitting frames into datagrams and reassembling them
//!
//! ## Wire Format
//! ```text
//! first datagram:  [Length(4)] [Tag(1)] [Body ...]   up to 1024 bytes
//! continuation:    [Body ...]                        up to 1024 bytes
//! ```
//!
//! ## Limits
//! - Maximum tagged payload: 16MB by default, checked before allocation
//! - A first datagram shorter than 5 bytes is malformed

pub mod codec;
pub mod fragment;
pub mod value;
