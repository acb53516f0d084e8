//! Batch accumulation, delivery, and spooling
//!
//! A single emitter task owns the accumulator. Contributions from workers
//! are merged under a mutex that is held only for the merge itself and the
//! snapshot-and-reset at flush time; the POST happens with no locks held.
//! Flushes are strictly sequential, so the sink observes snapshots in
//! order. A batch that cannot be delivered within the retry budget is
//! written to the spool directory and replayed during drain, so delivery
//! can be late but is never silently dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::graph::{Batch, Contribution};
use crate::metrics::Metrics;
use crate::{ConfigError, ConfigResult, OrbError, Result};

/// Total elapsed time allowed for delivery retries of one batch
const RETRY_BUDGET: Duration = Duration::from_secs(30);

/// First retry delay; doubles per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub struct Emitter {
    ingest: String,
    probe_id: String,
    run_id: String,
    batch_max_edges: usize,
    flush_every: Duration,
    spool_dir: PathBuf,
    client: reqwest::Client,
    acc: Mutex<Batch>,
    retry_budget: Duration,
    metrics: Arc<Metrics>,
}

impl Emitter {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> ConfigResult<Self> {
        let client = build_sink_client(config)?;
        std::fs::create_dir_all(&config.spool_dir)?;
        Ok(Self {
            ingest: config.ingest.clone(),
            probe_id: config.probe.clone(),
            run_id: config.run.clone(),
            batch_max_edges: config.batch_max_edges,
            flush_every: Duration::from_secs(config.batch_flush_sec),
            spool_dir: PathBuf::from(&config.spool_dir),
            client,
            acc: Mutex::new(Batch::new(&config.probe, &config.run)),
            retry_budget: RETRY_BUDGET,
            metrics,
        })
    }

    /// Shrinks the retry budget; used by tests to keep failures fast
    #[cfg(test)]
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Emitter main loop: merge, flush on size or timer, stop on close
    ///
    /// Returns once the contribution channel closes (all workers done) or
    /// the hard-cancel token fires. Callers follow up with [`drain`](Self::drain)
    /// on the graceful path.
    pub async fn run(&self, mut rx: mpsc::Receiver<Contribution>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.flush_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                contribution = rx.recv() => match contribution {
                    Some(contribution) => {
                        if self.append(contribution) {
                            self.flush().await;
                            ticker.reset();
                        }
                    }
                    None => return,
                },
                _ = ticker.tick() => self.flush().await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Merges one contribution; true when a size trigger was crossed
    pub fn append(&self, contribution: Contribution) -> bool {
        let mut acc = self.acc.lock().unwrap();
        acc.absorb(contribution);
        acc.edges.len() >= self.batch_max_edges || acc.node_count() >= self.batch_max_edges / 2
    }

    /// Snapshots and delivers the accumulator
    ///
    /// No-op when empty. On delivery failure the snapshot lands in the
    /// spool before this returns.
    pub async fn flush(&self) {
        let snapshot = {
            let mut acc = self.acc.lock().unwrap();
            if acc.is_empty() {
                return;
            }
            std::mem::replace(&mut *acc, Batch::new(&self.probe_id, &self.run_id))
        };

        if self.ingest.is_empty() {
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, "batch serialization failed"),
            }
            Metrics::incr(&self.metrics.batches_flushed);
            return;
        }

        match self.deliver(&snapshot).await {
            Ok(()) => Metrics::incr(&self.metrics.batches_flushed),
            Err(e) => {
                tracing::warn!(error = %e, "ingest failed, spooling batch");
                self.spool(&snapshot).await;
            }
        }
    }

    /// POSTs one batch with exponential backoff under the retry budget
    async fn deliver(&self, batch: &Batch) -> Result<()> {
        let started = std::time::Instant::now();
        let mut delay = RETRY_BASE_DELAY;

        loop {
            match self.post(batch).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if started.elapsed() + delay >= self.retry_budget {
                        return Err(e);
                    }
                    tracing::debug!(error = %e, retry_in = ?delay, "ingest POST failed");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn post(&self, batch: &Batch) -> Result<()> {
        let response = self
            .client
            .post(&self.ingest)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(OrbError::SinkStatus(status.as_u16()))
        }
    }

    /// Writes a batch to the spool as a timestamped JSON file
    async fn spool(&self, batch: &Batch) {
        let name = format!("{}.json", Utc::now().format("%Y%m%dT%H%M%S%.9f"));
        let path = self.spool_dir.join(name);
        match serde_json::to_vec(batch) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    tracing::error!(path = %path.display(), error = %e, "spool write failed");
                    return;
                }
                Metrics::incr(&self.metrics.batches_spooled);
                tracing::info!(path = %path.display(), "batch spooled");
            }
            Err(e) => tracing::error!(error = %e, "spool serialization failed"),
        }
    }

    /// Final flush plus spool replay
    ///
    /// Spool files are attempted in name order (the timestamp names make
    /// that chronological); each successful POST deletes its file, each
    /// failure leaves it for the next run.
    pub async fn drain(&self) {
        self.flush().await;

        if self.ingest.is_empty() {
            return;
        }

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(&self.spool_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "spool directory unreadable");
                return;
            }
        };
        paths.sort();

        for path in paths {
            match read_spooled(&path) {
                Ok(batch) => {
                    if self.post(&batch).await.is_ok() {
                        if let Err(e) = std::fs::remove_file(&path) {
                            tracing::warn!(path = %path.display(), error = %e, "spool delete failed");
                        } else {
                            Metrics::incr(&self.metrics.spool_replayed);
                        }
                    } else {
                        tracing::warn!(path = %path.display(), "spool replay failed, keeping file");
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable spool file");
                }
            }
        }
    }

    #[cfg(test)]
    fn accumulator_len(&self) -> (usize, usize) {
        let acc = self.acc.lock().unwrap();
        (acc.node_count(), acc.edges.len())
    }
}

fn read_spooled(path: &Path) -> Result<Batch> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Builds the HTTP client used only for sink POSTs
///
/// When mTLS material is configured the client presents it; a CA bundle,
/// if given, extends the trust roots for the sink connection only.
fn build_sink_client(config: &Config) -> ConfigResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .use_rustls_tls();

    if !config.mtls_cert.is_empty() {
        let cert = std::fs::read(&config.mtls_cert)?;
        let key = std::fs::read(&config.mtls_key)?;
        let mut pem = cert;
        pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ConfigError::InvalidTls(e.to_string()))?;
        builder = builder.identity(identity);
    }

    if !config.mtls_ca.is_empty() {
        let ca = std::fs::read(&config.mtls_ca)?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| ConfigError::InvalidTls(e.to_string()))?;
        builder = builder.add_root_certificate(ca);
    }

    builder
        .build()
        .map_err(|e| ConfigError::InvalidTls(e.to_string()))
}
