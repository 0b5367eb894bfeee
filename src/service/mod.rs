//! # Services
//!
//! Server-side orchestration built on [`Endpoint`](crate::Endpoint).

pub mod listener;

pub use listener::SessionListener;
