//! First-appearance deduplication for nodes and edges
//!
//! The pipeline asks `seen(key)` before adding anything to a contribution;
//! a key that was already marked is dropped so each entity and edge triple
//! is emitted at most once per run (memory backend) or per TTL window
//! (shared backend).
//!
//! Key shapes are part of the shared-store contract:
//! `domain|{host}`, `nodeip|{ip}`, `cert|{spki}`,
//! `edge|{source}|{type}|{target}`.

mod memory;
mod redis;

pub use memory::MemoryDedup;
pub use redis::RedisDedup;

use crate::graph::EdgeKind;

/// Set-membership with atomic test-and-mark semantics
///
/// `seen` returns true iff the key was already present; the first caller
/// for a key gets false and the key is marked. The Redis variant fails
/// open: backend errors report "not seen" so observations are never lost
/// to an outage, at the cost of possible duplicates downstream.
pub enum Dedup {
    Memory(MemoryDedup),
    Redis(RedisDedup),
}

impl Dedup {
    pub fn memory() -> Self {
        Dedup::Memory(MemoryDedup::new())
    }

    pub async fn seen(&self, key: &str) -> bool {
        match self {
            Dedup::Memory(m) => m.seen(key),
            Dedup::Redis(r) => r.seen(key).await,
        }
    }
}

pub fn domain_key(host: &str) -> String {
    format!("domain|{host}")
}

pub fn ip_key(ip: &str) -> String {
    format!("nodeip|{ip}")
}

pub fn cert_key(spki: &str) -> String {
    format!("cert|{spki}")
}

pub fn edge_key(source: &str, kind: EdgeKind, target: &str) -> String {
    format!("edge|{source}|{}|{target}", kind.as_str())
}
