//! Orbweaver: a policy-aware domain relationship prober
//!
//! This crate turns a stream of hostnames into a typed graph of inter-domain
//! relationships. For each host it resolves DNS records, inspects the TLS
//! leaf certificate, and extracts external links from the root page, then
//! batches the resulting nodes and edges toward a downstream ingest sink,
//! spooling batches on disk when the sink is unreachable.

pub mod breaker;
pub mod config;
pub mod dedup;
pub mod emit;
pub mod graph;
pub mod limiter;
pub mod metrics;
pub mod net;
pub mod probe;
pub mod queue;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for orbweaver operations
#[derive(Debug, Error)]
pub enum OrbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("circuit breaker open for {host}")]
    BreakerOpen { host: String },

    #[error("TLS inspection failed for {host}: {source}")]
    Tls { host: String, source: TlsError },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Dedup backend error: {0}")]
    Dedup(String),

    #[error("Sink rejected batch with status {0}")]
    SinkStatus(u16),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid mTLS material: {0}")]
    InvalidTls(String),
}

/// Errors from the raw TLS certificate inspection path
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to resolve {0}")]
    Resolve(String),

    #[error("invalid server name: {0}")]
    ServerName(String),

    #[error("connect failed: {0}")]
    Connect(std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("certificate parse failed: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type alias for orbweaver operations
pub type Result<T> = std::result::Result<T, OrbError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::graph::{Batch, Contribution, Edge, EdgeKind};
pub use crate::url::{apex, normalize_host};
