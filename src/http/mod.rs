//! HTTP transport for the item service
//!
//! Provides the REST handlers for the health check and the `/items` resource.

pub mod handlers;
