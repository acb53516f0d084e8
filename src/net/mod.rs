//! Network-facing components: DNS resolution, TLS inspection, and the
//! breaker-wrapped HTTP client

pub mod client;
pub mod dns;
pub mod tls;

pub use client::{build_http_client, ResilientClient};
pub use dns::{new_resolver, resolve_all, DnsRecords};
pub use tls::{fetch_cert, init_crypto};
