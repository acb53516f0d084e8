//! orbweaver main entry point
//!
//! Wires configuration, the shared network components, the worker pool,
//! and the emitter together, and supervises shutdown: the first signal
//! stops intake and lets in-flight hosts finish, a second signal cancels
//! hard.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use orbweaver::config::{load_config, CliOverrides};
use orbweaver::dedup::{Dedup, RedisDedup};
use orbweaver::emit::Emitter;
use orbweaver::limiter::HostRateLimiter;
use orbweaver::metrics::Metrics;
use orbweaver::net::{build_http_client, init_crypto, new_resolver, ResilientClient};
use orbweaver::probe::{file_producer, queue_producer, run_workers, Probe, Task, TASK_QUEUE_CAPACITY};
use orbweaver::queue::WorkQueue;
use orbweaver::robots::RobotsCache;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// orbweaver: a policy-aware domain relationship prober
#[derive(Parser, Debug)]
#[command(name = "orbweaver")]
#[command(version)]
#[command(about = "Maps DNS, TLS, and link relationships between domains", long_about = None)]
struct Cli {
    /// Optional TOML configuration file (flags override file values)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to newline-separated domains file
    #[arg(long)]
    domains: Option<String>,

    /// Probe identity attached to emitted edges
    #[arg(long)]
    probe: Option<String>,

    /// Run identity attached to emitted edges
    #[arg(long)]
    run: Option<String>,

    /// User-Agent used for robots and root-page fetches
    #[arg(long)]
    ua: Option<String>,

    /// Comma-separated TLDs to exclude from HTTP/TLS probing
    #[arg(long)]
    exclude_tlds: Option<String>,

    /// Number of concurrent host workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Ingest endpoint; omit to print batches to stdout
    #[arg(long)]
    ingest: Option<String>,

    /// Edge count that forces a batch flush
    #[arg(long)]
    batch_max_edges: Option<usize>,

    /// Seconds between timer-driven flushes
    #[arg(long)]
    batch_flush_sec: Option<u64>,

    /// Directory for undeliverable batches
    #[arg(long)]
    spool_dir: Option<String>,

    /// Client certificate (PEM) for mTLS toward the sink
    #[arg(long)]
    mtls_cert: Option<String>,

    /// Client key (PEM) for mTLS toward the sink
    #[arg(long)]
    mtls_key: Option<String>,

    /// CA bundle (PEM) trusted for the sink only
    #[arg(long)]
    mtls_ca: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let overrides = CliOverrides {
        domains: cli.domains,
        probe: cli.probe,
        run: cli.run,
        ua: cli.ua,
        exclude_tlds: cli.exclude_tlds,
        concurrency: cli.concurrency,
        ingest: cli.ingest,
        batch_max_edges: cli.batch_max_edges,
        batch_flush_sec: cli.batch_flush_sec,
        spool_dir: cli.spool_dir,
        mtls_cert: cli.mtls_cert,
        mtls_key: cli.mtls_key,
        mtls_ca: cli.mtls_ca,
    };
    let config = match load_config(cli.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return Err(e.into());
        }
    };
    tracing::info!(
        probe = %config.probe,
        run = %config.run,
        concurrency = config.concurrency,
        "starting"
    );

    init_crypto();
    let metrics = Metrics::new();

    // Hard-cancel propagates to every suspension point; graceful shutdown
    // only stops intake
    let cancel = CancellationToken::new();
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone(), cancel.clone());

    let http = build_http_client(&config.ua)?;
    let robots = RobotsCache::new(http.clone(), &config.ua);
    let resilient = ResilientClient::new(http, Arc::clone(&metrics));
    let resolver = new_resolver();

    let dedup = if config.redis_addr.is_empty() {
        tracing::info!("in-memory dedup enabled");
        Dedup::memory()
    } else {
        let redis = RedisDedup::connect(
            &config.redis_addr,
            RedisDedup::DEFAULT_TTL,
            Arc::clone(&metrics),
        )?;
        tracing::info!(addr = %config.redis_addr, "redis dedup enabled");
        Dedup::Redis(redis)
    };

    let limiter = HostRateLimiter::new(config.rate_per_sec, config.rate_burst);
    limiter.spawn_janitor(cancel.child_token());

    let emitter = Arc::new(Emitter::new(&config, Arc::clone(&metrics))?);
    let (contribution_tx, contribution_rx) = mpsc::channel(1024);

    let emitter_task = {
        let emitter = Arc::clone(&emitter);
        let cancel = cancel.clone();
        tokio::spawn(async move { emitter.run(contribution_rx, cancel).await })
    };

    let probe = Arc::new(Probe::new(
        &config.ua,
        &config.probe,
        &config.run,
        config.exclude_tlds.clone(),
        dedup,
        resolver,
        resilient,
        robots,
        limiter,
        contribution_tx,
        Arc::clone(&metrics),
        cancel.clone(),
    ));

    let (task_tx, task_rx) = async_channel::bounded::<Task>(TASK_QUEUE_CAPACITY);

    let queue = if config.queue_enabled() {
        let queue = Arc::new(WorkQueue::connect(
            &config.redis_queue_addr,
            &config.redis_queue_key,
        )?);
        tracing::info!(
            addr = %config.redis_queue_addr,
            key = %config.redis_queue_key,
            "redis work queue enabled"
        );
        let producer_queue = Arc::clone(&queue);
        let shutdown = shutdown.clone();
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            queue_producer(producer_queue, task_tx, shutdown, metrics).await;
        });
        Some(queue)
    } else {
        let path = config.domains.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = file_producer(&path, task_tx, shutdown).await {
                tracing::error!(error = %e, "domains file reader failed");
            }
        });
        None
    };

    run_workers(
        Arc::clone(&probe),
        queue,
        task_rx,
        config.concurrency,
        Arc::clone(&metrics),
    )
    .await;

    // Workers are done; releasing the probe closes the contribution
    // channel so the emitter loop can finish
    drop(probe);
    if let Err(e) = emitter_task.await {
        tracing::error!(error = %e, "emitter task failed");
    }

    emitter.drain().await;
    metrics.log_summary();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("orbweaver=info,warn"),
            1 => EnvFilter::new("orbweaver=debug,info"),
            2 => EnvFilter::new("orbweaver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// First signal: graceful (stop intake, finish in-flight hosts, drain).
/// Second signal: hard cancel.
fn spawn_signal_handler(shutdown: CancellationToken, cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received, finishing in-flight hosts");
        shutdown.cancel();

        wait_for_signal().await;
        tracing::warn!("second signal, cancelling in-flight work");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
