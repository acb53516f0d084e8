use serde::Deserialize;

/// Main configuration structure for orbweaver
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the newline-separated domains file
    pub domains: String,

    /// Probe identity attached to every edge
    pub probe: String,

    /// Run identity attached to every edge (defaults to run-{unix_seconds})
    pub run: String,

    /// User-Agent for robots and root-page fetches
    pub ua: String,

    /// TLDs whose hosts are never fetched over HTTP/TLS
    pub exclude_tlds: Vec<String>,

    /// Number of concurrent host workers
    pub concurrency: usize,

    /// Ingest endpoint; empty means print batches to stdout
    pub ingest: String,

    /// Edge count that forces a flush
    pub batch_max_edges: usize,

    /// Seconds between timer-driven flushes
    pub batch_flush_sec: u64,

    /// Directory for batches that could not be delivered
    pub spool_dir: String,

    /// Client certificate (PEM) for mTLS toward the ingest sink
    pub mtls_cert: String,

    /// Client key (PEM) for mTLS toward the ingest sink
    pub mtls_key: String,

    /// Extra CA bundle (PEM) trusted for the ingest sink only
    pub mtls_ca: String,

    /// Per-host rate limit in requests per second
    pub rate_per_sec: f64,

    /// Per-host rate limit burst
    pub rate_burst: u32,

    /// Redis address for the shared deduplicator (env: REDIS_ADDR)
    #[serde(skip)]
    pub redis_addr: String,

    /// Redis address for the work queue (env: REDIS_QUEUE_ADDR)
    #[serde(skip)]
    pub redis_queue_addr: String,

    /// Work queue list key (env: REDIS_QUEUE_KEY)
    #[serde(skip)]
    pub redis_queue_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: String::new(),
            probe: "local-1".to_string(),
            run: String::new(),
            ua: "orbweaver/0.1 (+https://github.com/orbweaver/orbweaver)".to_string(),
            exclude_tlds: vec!["gov".to_string(), "mil".to_string(), "int".to_string()],
            concurrency: 256,
            ingest: String::new(),
            batch_max_edges: 10_000,
            batch_flush_sec: 2,
            spool_dir: "spool".to_string(),
            mtls_cert: String::new(),
            mtls_key: String::new(),
            mtls_ca: String::new(),
            rate_per_sec: 1.0,
            rate_burst: 1,
            redis_addr: String::new(),
            redis_queue_addr: String::new(),
            redis_queue_key: "orbweaver:queue".to_string(),
        }
    }
}

impl Config {
    /// Whether host input comes from the Redis work queue instead of a file
    pub fn queue_enabled(&self) -> bool {
        !self.redis_queue_addr.is_empty()
    }

    /// Whether batches go to an ingest endpoint rather than stdout
    pub fn sink_enabled(&self) -> bool {
        !self.ingest.is_empty()
    }
}
