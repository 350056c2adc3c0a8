//! Chrome DevTools Protocol client.
//!
//! This crate owns the wire types, the websocket transport, request/response
//! correlation, and ordered event dispatch used by the session orchestrator.
//! It speaks the protocol; policy (what to send, when) lives in the caller.

pub mod connection;
pub mod error;
pub mod message;
pub mod testing;
pub mod transport;

pub use connection::{CdpEvent, CdpSession, Connection};
pub use error::{CdpError, Result};
