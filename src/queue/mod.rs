//! Redis-backed work queue with lease semantics
//!
//! Hosts are JSON entries on a single list; `lease` atomically moves one
//! entry from the queue tail onto a processing list (`{key}:processing`)
//! and hands back a [`Lease`]. Acking removes that exact entry from the
//! processing list. A worker that dies mid-host leaves its entry on the
//! processing list, visible for operator recovery. Delivery is
//! at-least-once.

use chrono::Utc;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use serde::{Deserialize, Serialize};

use crate::{OrbError, Result};

/// Wire format of one queue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub host: String,
    pub ts: i64,
    pub attempt: u32,
}

/// A leased queue entry awaiting acknowledgement
///
/// Holds the raw JSON exactly as stored so the ack can `LREM` the precise
/// entry that was moved.
#[derive(Debug)]
pub struct Lease {
    pub host: String,
    raw: String,
}

pub struct WorkQueue {
    pool: Pool,
    queue_key: String,
    processing_key: String,
}

impl WorkQueue {
    pub fn connect(addr: &str, key: &str) -> Result<Self> {
        let cfg = PoolConfig::from_url(format!("redis://{addr}"));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| OrbError::Queue(format!("redis pool: {e}")))?;
        Ok(Self {
            pool,
            queue_key: key.to_string(),
            processing_key: format!("{key}:processing"),
        })
    }

    /// Appends a host to the queue tail
    pub async fn seed(&self, host: &str) -> Result<()> {
        let item = QueueItem {
            host: host.to_string(),
            ts: Utc::now().timestamp(),
            attempt: 0,
        };
        let raw = serde_json::to_string(&item)?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;
        deadpool_redis::redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(raw)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;
        Ok(())
    }

    /// Leases one entry, blocking server-side for up to five seconds
    ///
    /// Returns `Ok(None)` when the queue stayed empty for the whole block.
    /// The move onto the processing list is a single Redis command, so two
    /// workers can never lease the same entry.
    pub async fn lease(&self) -> Result<Option<Lease>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;
        let raw: Option<String> = deadpool_redis::redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg(5)
            .query_async(&mut conn)
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let item: QueueItem = serde_json::from_str(&raw)?;
        Ok(Some(Lease {
            host: item.host,
            raw,
        }))
    }

    /// Removes a leased entry from the processing list
    pub async fn ack(&self, lease: Lease) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;
        deadpool_redis::redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(lease.raw)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| OrbError::Queue(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_item_wire_format() {
        let item = QueueItem {
            host: "example.com".to_string(),
            ts: 1_750_000_000,
            attempt: 0,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["host"], "example.com");
        assert_eq!(json["ts"], 1_750_000_000);
        assert_eq!(json["attempt"], 0);
    }

    #[test]
    fn test_queue_item_roundtrip() {
        let raw = r#"{"host":"example.com","ts":1750000000,"attempt":2}"#;
        let item: QueueItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.host, "example.com");
        assert_eq!(item.attempt, 2);
        let back = serde_json::to_string(&item).unwrap();
        let again: QueueItem = serde_json::from_str(&back).unwrap();
        assert_eq!(again.host, item.host);
    }
}
