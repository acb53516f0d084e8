//! Concurrent DNS resolution
//!
//! One call fans out the five record lookups a host contributes to the
//! graph. Lookups are independent: a missing MX record (or a SERVFAIL on
//! TXT) never hides the A records. Names coming back from the resolver
//! carry the root dot and arbitrary case; both are normalized away here so
//! the pipeline can use the values as node identifiers directly.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use tokio_util::sync::CancellationToken;

use crate::url::normalize_host;

/// Everything DNS told us about one host
#[derive(Debug, Clone, Default)]
pub struct DnsRecords {
    /// A and AAAA answers in canonical text form
    pub ips: Vec<String>,
    pub nameservers: Vec<String>,
    pub cname: Option<String>,
    pub mxs: Vec<String>,
    pub txts: Vec<String>,
}

/// Builds the shared resolver from system defaults
pub fn new_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
}

/// Resolves A/AAAA, NS, CNAME, MX, and TXT concurrently
///
/// Each failed lookup yields its empty value. Cancellation returns an
/// empty record set immediately.
pub async fn resolve_all(
    cancel: &CancellationToken,
    resolver: &TokioAsyncResolver,
    host: &str,
) -> DnsRecords {
    tokio::select! {
        records = lookups(resolver, host) => records,
        _ = cancel.cancelled() => DnsRecords::default(),
    }
}

async fn lookups(resolver: &TokioAsyncResolver, host: &str) -> DnsRecords {
    let (ip_result, ns_result, cname_result, mx_result, txt_result) = tokio::join!(
        resolver.lookup_ip(host),
        resolver.ns_lookup(host),
        resolver.lookup(host, RecordType::CNAME),
        resolver.mx_lookup(host),
        resolver.txt_lookup(host),
    );

    let ips = ip_result
        .map(|lookup| lookup.iter().map(|ip| ip.to_string()).collect())
        .unwrap_or_default();

    let nameservers = ns_result
        .map(|lookup| {
            lookup
                .iter()
                .map(|ns| normalize_host(&ns.0.to_utf8()))
                .collect()
        })
        .unwrap_or_default();

    let cname = cname_result
        .ok()
        .and_then(|lookup| {
            lookup.iter().find_map(|rdata| match rdata {
                RData::CNAME(name) => Some(normalize_host(&name.0.to_utf8())),
                _ => None,
            })
        })
        .filter(|name| !name.is_empty());

    let mxs = mx_result
        .map(|lookup| {
            lookup
                .iter()
                .map(|mx| normalize_host(&mx.exchange().to_utf8()))
                .collect()
        })
        .unwrap_or_default();

    let txts = txt_result
        .map(|lookup| lookup.iter().map(|txt| txt.to_string()).collect())
        .unwrap_or_default();

    DnsRecords {
        ips,
        nameservers,
        cname,
        mxs,
        txts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_records_are_empty() {
        let records = DnsRecords::default();
        assert!(records.ips.is_empty());
        assert!(records.cname.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_resolution_returns_empty() {
        let resolver = new_resolver();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let records = resolve_all(&cancel, &resolver, "example.com").await;
        assert!(records.ips.is_empty());
        assert!(records.nameservers.is_empty());
        assert!(records.mxs.is_empty());
    }

    #[tokio::test]
    async fn test_nonexistent_host_yields_empty_records() {
        let resolver = new_resolver();
        let cancel = CancellationToken::new();

        // Reserved TLD, guaranteed NXDOMAIN without network assumptions
        let records = resolve_all(&cancel, &resolver, "no-such-host.invalid").await;
        assert!(records.ips.is_empty());
        assert!(records.nameservers.is_empty());
        assert!(records.cname.is_none());
        assert!(records.mxs.is_empty());
        assert!(records.txts.is_empty());
    }
}
