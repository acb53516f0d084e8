use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain observed during a run, keyed by normalized host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNode {
    /// Normalized hostname (lowercase, no trailing dot)
    pub host: String,
    /// Registrable domain under public suffix rules
    pub apex: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// An IP address observed in A/AAAA answers, keyed by canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpNode {
    pub ip: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Metadata derived from a TLS leaf certificate, keyed by SPKI hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertNode {
    /// Standard base64 of SHA-256 over the SubjectPublicKeyInfo DER
    pub spki_sha256: String,
    pub subject_cn: String,
    pub issuer_cn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// The six relationship types the probe emits
///
/// Source and target kinds are fixed per variant: `ResolvesTo` points from a
/// domain to an IP, `UsesCert` from a domain to a cert SPKI, the rest are
/// domain-to-domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "RESOLVES_TO")]
    ResolvesTo,
    #[serde(rename = "USES_NS")]
    UsesNs,
    #[serde(rename = "ALIAS_OF")]
    AliasOf,
    #[serde(rename = "USES_MX")]
    UsesMx,
    #[serde(rename = "LINKS_TO")]
    LinksTo,
    #[serde(rename = "USES_CERT")]
    UsesCert,
}

impl EdgeKind {
    /// The wire name, as used inside dedup keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::ResolvesTo => "RESOLVES_TO",
            EdgeKind::UsesNs => "USES_NS",
            EdgeKind::AliasOf => "ALIAS_OF",
            EdgeKind::UsesMx => "USES_MX",
            EdgeKind::LinksTo => "LINKS_TO",
            EdgeKind::UsesCert => "USES_CERT",
        }
    }
}

/// A typed relationship between two node identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub source: String,
    pub target: String,
    pub observed_at: DateTime<Utc>,
    pub probe_id: String,
    pub run_id: String,
}

/// Delivery unit for the ingest sink
///
/// Serialized as a single JSON object; the field names here are the wire
/// contract and must not change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub probe_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub nodes_domain: Vec<DomainNode>,
    #[serde(default)]
    pub nodes_ip: Vec<IpNode>,
    #[serde(default)]
    pub nodes_cert: Vec<CertNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Batch {
    pub fn new(probe_id: &str, run_id: &str) -> Self {
        Self {
            probe_id: probe_id.to_string(),
            run_id: run_id.to_string(),
            ..Default::default()
        }
    }

    /// Total entity count across all node kinds
    pub fn node_count(&self) -> usize {
        self.nodes_domain.len() + self.nodes_ip.len() + self.nodes_cert.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0 && self.edges.is_empty()
    }

    /// Merges a per-host contribution into the accumulator
    pub fn absorb(&mut self, c: Contribution) {
        self.nodes_domain.extend(c.nodes_domain);
        self.nodes_ip.extend(c.nodes_ip);
        self.nodes_cert.extend(c.nodes_cert);
        self.edges.extend(c.edges);
    }
}

/// Everything one host's pipeline pass produced
///
/// Owned by the pipeline until handed to the emitter, which merges it into
/// the accumulating [`Batch`]. A contribution is emitted atomically: two
/// workers never interleave rows for the same host.
#[derive(Debug, Clone, Default)]
pub struct Contribution {
    pub nodes_domain: Vec<DomainNode>,
    pub nodes_ip: Vec<IpNode>,
    pub nodes_cert: Vec<CertNode>,
    pub edges: Vec<Edge>,
}

impl Contribution {
    pub fn is_empty(&self) -> bool {
        self.nodes_domain.is_empty()
            && self.nodes_ip.is_empty()
            && self.nodes_cert.is_empty()
            && self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_edge_kind_wire_names() {
        assert_eq!(EdgeKind::ResolvesTo.as_str(), "RESOLVES_TO");
        assert_eq!(EdgeKind::UsesNs.as_str(), "USES_NS");
        assert_eq!(EdgeKind::AliasOf.as_str(), "ALIAS_OF");
        assert_eq!(EdgeKind::UsesMx.as_str(), "USES_MX");
        assert_eq!(EdgeKind::LinksTo.as_str(), "LINKS_TO");
        assert_eq!(EdgeKind::UsesCert.as_str(), "USES_CERT");
    }

    #[test]
    fn test_edge_serializes_type_field() {
        let edge = Edge {
            kind: EdgeKind::LinksTo,
            source: "a.example".to_string(),
            target: "b.example".to_string(),
            observed_at: ts(),
            probe_id: "p1".to_string(),
            run_id: "r1".to_string(),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "LINKS_TO");
        assert_eq!(json["source"], "a.example");
        assert_eq!(json["observed_at"], "2025-06-01T12:00:00Z");
    }

    #[test]
    fn test_batch_field_names_are_wire_exact() {
        let mut batch = Batch::new("probe-1", "run-1");
        batch.nodes_domain.push(DomainNode {
            host: "example.com".to_string(),
            apex: "example.com".to_string(),
            first_seen: ts(),
            last_seen: ts(),
        });
        batch.nodes_ip.push(IpNode {
            ip: "93.184.216.34".to_string(),
            first_seen: ts(),
            last_seen: ts(),
        });
        batch.nodes_cert.push(CertNode {
            spki_sha256: "c2lnbmF0dXJl".to_string(),
            subject_cn: "example.com".to_string(),
            issuer_cn: "Test CA".to_string(),
            not_before: ts(),
            not_after: ts(),
        });

        let json = serde_json::to_value(&batch).unwrap();
        let object = json.as_object().unwrap();
        for key in ["probe_id", "run_id", "nodes_domain", "nodes_ip", "nodes_cert", "edges"] {
            assert!(object.contains_key(key), "missing batch field {key}");
        }
        assert_eq!(json["nodes_cert"][0]["spki_sha256"], "c2lnbmF0dXJl");
    }

    #[test]
    fn test_batch_roundtrip() {
        let mut batch = Batch::new("p", "r");
        batch.edges.push(Edge {
            kind: EdgeKind::ResolvesTo,
            source: "example.com".to_string(),
            target: "10.0.0.1".to_string(),
            observed_at: ts(),
            probe_id: "p".to_string(),
            run_id: "r".to_string(),
        });
        let text = serde_json::to_string(&batch).unwrap();
        let back: Batch = serde_json::from_str(&text).unwrap();
        assert_eq!(back.edges.len(), 1);
        assert_eq!(back.edges[0].kind, EdgeKind::ResolvesTo);
    }

    #[test]
    fn test_absorb_merges_all_sections() {
        let mut batch = Batch::new("p", "r");
        let mut contribution = Contribution::default();
        contribution.nodes_domain.push(DomainNode {
            host: "example.com".to_string(),
            apex: "example.com".to_string(),
            first_seen: ts(),
            last_seen: ts(),
        });
        contribution.edges.push(Edge {
            kind: EdgeKind::UsesNs,
            source: "example.com".to_string(),
            target: "ns1.example.net".to_string(),
            observed_at: ts(),
            probe_id: "p".to_string(),
            run_id: "r".to_string(),
        });

        assert!(batch.is_empty());
        batch.absorb(contribution);
        assert_eq!(batch.node_count(), 1);
        assert_eq!(batch.edges.len(), 1);
        assert!(!batch.is_empty());
    }
}
