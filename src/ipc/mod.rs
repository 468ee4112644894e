//! Local IPC layer serving skill requests.
//!
//! Provides the Unix domain socket listener, the per-connection handler,
//! and the request/response codec.

pub mod codec;
pub mod server;
