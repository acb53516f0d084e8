//! Worker pool and host producers
//!
//! Hosts flow through a bounded channel: producers (the domains-file
//! reader or the queue adapter) push [`Task`]s, a fixed set of workers
//! pulls them. The channel bound gives natural backpressure: a slow
//! crawl stalls the producer instead of ballooning memory. Each host runs
//! inside its own task so a panic is contained at the join boundary.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::probe::Probe;
use crate::queue::{Lease, WorkQueue};
use crate::url::normalize_host;
use crate::Result;

/// Capacity of the host channel between producers and workers
pub const TASK_QUEUE_CAPACITY: usize = 8192;

/// One unit of work for a host worker
///
/// Tasks leased from the work queue carry their lease so the worker can
/// ack only after the host's contribution reached the emitter.
pub struct Task {
    pub host: String,
    pub lease: Option<Lease>,
}

/// Reads hosts from a newline-separated domains file
///
/// Blank lines and `#` comments are skipped; every host is normalized
/// before it enters the channel. Stops early on shutdown.
pub async fn file_producer(
    path: &str,
    tx: async_channel::Sender<Task>,
    shutdown: CancellationToken,
) -> Result<()> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    while let Some(line) = lines.next_line().await? {
        if shutdown.is_cancelled() {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let host = normalize_host(trimmed);
        if tx.send(Task { host, lease: None }).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Feeds workers from the Redis work queue until shutdown
///
/// Lease errors are counted and retried after a short pause rather than
/// ending the producer; a Redis blip should not stop the probe.
pub async fn queue_producer(
    queue: Arc<WorkQueue>,
    tx: async_channel::Sender<Task>,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let lease = tokio::select! {
            lease = queue.lease() => lease,
            _ = shutdown.cancelled() => return,
        };
        match lease {
            Ok(Some(lease)) => {
                let host = normalize_host(&lease.host);
                if tx
                    .send(Task {
                        host,
                        lease: Some(lease),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => {} // queue stayed empty through the blocking window
            Err(e) => {
                tracing::warn!(error = %e, "queue lease failed");
                Metrics::incr(&metrics.queue_errors);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Runs the fixed worker pool until the task channel closes
///
/// Each host is crawled inside a spawned task; a panicking host shows up
/// as a `JoinError` here and is counted without disturbing the worker.
pub async fn run_workers(
    probe: Arc<Probe>,
    queue: Option<Arc<WorkQueue>>,
    rx: async_channel::Receiver<Task>,
    concurrency: usize,
    metrics: Arc<Metrics>,
) {
    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency.max(1) {
        let probe = Arc::clone(&probe);
        let queue = queue.clone();
        let rx = rx.clone();
        let metrics = Arc::clone(&metrics);

        workers.push(tokio::spawn(async move {
            while let Ok(task) = rx.recv().await {
                let host = task.host.clone();
                let probe_for_host = Arc::clone(&probe);
                let handle =
                    tokio::spawn(async move { probe_for_host.crawl_one(&host).await });

                match handle.await {
                    Ok(()) => Metrics::incr(&metrics.tasks_ok),
                    Err(join_error) => {
                        if join_error.is_panic() {
                            tracing::error!(host = %task.host, "worker task panicked");
                            Metrics::incr(&metrics.tasks_panicked);
                        }
                        Metrics::incr(&metrics.tasks_failed);
                    }
                }

                // Ack only after the contribution had its chance to reach
                // the emitter
                if let (Some(queue), Some(lease)) = (queue.as_ref(), task.lease) {
                    if let Err(e) = queue.ack(lease).await {
                        tracing::warn!(error = %e, "queue ack failed");
                        Metrics::incr(&metrics.queue_errors);
                    }
                }
            }
        }));
    }

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "worker join failed");
        }
    }
}
