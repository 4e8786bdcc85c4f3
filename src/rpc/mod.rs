//! JSON-RPC sum server
//!
//! Provides the wire types, error codes and method dispatch behind `POST /rpc`.

pub mod protocol;
pub mod server;
