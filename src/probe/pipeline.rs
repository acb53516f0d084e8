//! Per-host crawl pipeline
//!
//! Steps run in a fixed order: normalize, provisional domain node, DNS,
//! TLD policy, robots policy, rate limit, root-page fetch, TLS
//! inspection, flush. Policy denials short-circuit after the DNS
//! contributions; failures in any data-producing step cost only that
//! step's contribution, never the host. A cancelled pipeline exits at the
//! next suspension point and discards what it had collected instead of
//! emitting a half-filled batch.

use std::sync::Arc;

use chrono::Utc;
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dedup::{cert_key, domain_key, edge_key, ip_key, Dedup};
use crate::graph::{Contribution, DomainNode, Edge, EdgeKind, IpNode};
use crate::limiter::HostRateLimiter;
use crate::metrics::Metrics;
use crate::net::{fetch_cert, resolve_all, ResilientClient};
use crate::robots::{skip_by_tld, RobotsCache};
use crate::url::{apex, normalize_host};

/// Root-page bodies are read up to this many bytes
const BODY_CAP: usize = 512 * 1024;

/// One probe instance: everything a worker needs to crawl a host
pub struct Probe {
    ua: String,
    probe_id: String,
    run_id: String,
    excluded_tlds: Vec<String>,
    dedup: Dedup,
    resolver: TokioAsyncResolver,
    http: ResilientClient,
    robots: RobotsCache,
    limiter: HostRateLimiter,
    out: mpsc::Sender<Contribution>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl Probe {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ua: &str,
        probe_id: &str,
        run_id: &str,
        excluded_tlds: Vec<String>,
        dedup: Dedup,
        resolver: TokioAsyncResolver,
        http: ResilientClient,
        robots: RobotsCache,
        limiter: HostRateLimiter,
        out: mpsc::Sender<Contribution>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ua: ua.to_string(),
            probe_id: probe_id.to_string(),
            run_id: run_id.to_string(),
            excluded_tlds,
            dedup,
            resolver,
            http,
            robots,
            limiter,
            out,
            metrics,
            cancel,
        }
    }

    pub fn breakers(&self) -> &crate::breaker::HostBreakers {
        self.http.breakers()
    }

    /// Runs the full pipeline for one hostname
    pub async fn crawl_one(&self, raw_host: &str) {
        let host = normalize_host(raw_host);
        if host.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut contribution = Contribution::default();

        // Provisional node for the host itself
        if !self.dedup.seen(&domain_key(&host)).await {
            contribution.nodes_domain.push(DomainNode {
                host: host.clone(),
                apex: apex(&host),
                first_seen: now,
                last_seen: now,
            });
        }

        if self.cancel.is_cancelled() {
            return;
        }

        // DNS contributions are collected even when policy later blocks
        // the HTTP path
        let records = resolve_all(&self.cancel, &self.resolver, &host).await;

        for ip in &records.ips {
            if !self.dedup.seen(&ip_key(ip)).await {
                contribution.nodes_ip.push(IpNode {
                    ip: ip.clone(),
                    first_seen: now,
                    last_seen: now,
                });
            }
            self.add_edge(&mut contribution, EdgeKind::ResolvesTo, &host, ip, now)
                .await;
        }
        for ns in &records.nameservers {
            self.add_domain(&mut contribution, ns, now).await;
            self.add_edge(&mut contribution, EdgeKind::UsesNs, &host, ns, now)
                .await;
        }
        if let Some(cname) = &records.cname {
            self.add_domain(&mut contribution, cname, now).await;
            self.add_edge(&mut contribution, EdgeKind::AliasOf, &host, cname, now)
                .await;
        }
        for mx in &records.mxs {
            self.add_domain(&mut contribution, mx, now).await;
            self.add_edge(&mut contribution, EdgeKind::UsesMx, &host, mx, now)
                .await;
        }

        // Policy gates: TLD exclusion, then robots
        if skip_by_tld(&host, &self.excluded_tlds) {
            Metrics::incr(&self.metrics.tld_skipped);
            self.flush(contribution).await;
            return;
        }

        if self.cancel.is_cancelled() {
            return;
        }
        let rules = self.robots.get(&host).await;
        if !rules.allowed(&self.ua, "/") {
            Metrics::incr(&self.metrics.robots_blocked);
            tracing::debug!(host = %host, "robots disallows root");
            self.flush(contribution).await;
            return;
        }

        tokio::select! {
            _ = self.limiter.wait(&host) => {}
            _ = self.cancel.cancelled() => return,
        }

        if let Some(html) = self.fetch_root(&host).await {
            for external in super::parser::external_domains(&host, &html) {
                self.add_domain(&mut contribution, &external, now).await;
                self.add_edge(&mut contribution, EdgeKind::LinksTo, &host, &external, now)
                    .await;
            }
        }

        if self.cancel.is_cancelled() {
            return;
        }
        match fetch_cert(&host).await {
            Ok(Some(cert)) => {
                let spki = cert.spki_sha256.clone();
                if !self.dedup.seen(&cert_key(&spki)).await {
                    contribution.nodes_cert.push(cert);
                }
                self.add_edge(&mut contribution, EdgeKind::UsesCert, &host, &spki, now)
                    .await;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(host = %host, error = %e, "tls inspection failed"),
        }

        self.flush(contribution).await;
    }

    /// Fetches the root page and returns its body when it is HTML
    async fn fetch_root(&self, host: &str) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let url = format!("https://{host}/");
        let response = match self.http.get(&url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(host, error = %e, "root fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return None;
        }

        read_capped(response).await
    }

    async fn add_domain(&self, contribution: &mut Contribution, host: &str, now: chrono::DateTime<Utc>) {
        if !self.dedup.seen(&domain_key(host)).await {
            contribution.nodes_domain.push(DomainNode {
                host: host.to_string(),
                apex: apex(host),
                first_seen: now,
                last_seen: now,
            });
        }
    }

    async fn add_edge(
        &self,
        contribution: &mut Contribution,
        kind: EdgeKind,
        source: &str,
        target: &str,
        now: chrono::DateTime<Utc>,
    ) {
        if !self.dedup.seen(&edge_key(source, kind, target)).await {
            contribution.edges.push(Edge {
                kind,
                source: source.to_string(),
                target: target.to_string(),
                observed_at: now,
                probe_id: self.probe_id.clone(),
                run_id: self.run_id.clone(),
            });
            Metrics::incr(&self.metrics.edges_emitted);
        }
    }

    /// Hands the host's contribution to the emitter as one unit
    async fn flush(&self, contribution: Contribution) {
        if contribution.is_empty() || self.cancel.is_cancelled() {
            return;
        }
        if self.out.send(contribution).await.is_err() {
            tracing::warn!("emitter channel closed, dropping contribution");
        }
    }
}

/// Reads a response body up to [`BODY_CAP`] bytes
async fn read_capped(mut response: reqwest::Response) -> Option<String> {
    let mut body: Vec<u8> = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = BODY_CAP - body.len();
                if chunk.len() >= remaining {
                    body.extend_from_slice(&chunk[..remaining]);
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "body read failed");
                return None;
            }
        }
    }
    Some(String::from_utf8_lossy(&body).into_owned())
}
