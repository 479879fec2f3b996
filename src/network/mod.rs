//! Network layer for vcrproxy
//!
//! Upstream HTTP(S) client, bounded connection admission and the small
//! request/response helpers shared by the proxy and the refresher.

mod client;
mod connection_pool;
mod http;

pub use client::{ensure_crypto_provider, ForwardRequest, UpstreamClient};
pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use http::{
    collect_body, empty_response, error_response, is_hop_by_hop, parse_query, strip_hop_by_hop,
    text_response,
};

/// Default maximum number of concurrent connections per proxy server
pub const MAX_CONNECTIONS: usize = 1024;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
