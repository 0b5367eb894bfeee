//! # Transport Layer
//!
//! Raw datagram I/O and per-peer demultiplexing.
//!
//! - **Datagram**: a UDP socket moving packets of at most 1024 bytes
//! - **Demux**: waits for one peer while parking everyone else's traffic

pub mod datagram;
pub mod demux;
