use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};

use crate::metrics::Metrics;
use crate::{OrbError, Result};

/// Shared deduplicator backed by Redis
///
/// Marking is `SET seen:{key} 1 NX EX {ttl}`, which is atomic on the
/// server: exactly one probe process wins the first sighting. Any backend
/// trouble fails open: the key is reported as unseen, the error counted
/// and logged, and the pipeline carries on.
pub struct RedisDedup {
    pool: Pool,
    ttl_secs: u64,
    metrics: Arc<Metrics>,
}

impl RedisDedup {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn connect(addr: &str, ttl: Duration, metrics: Arc<Metrics>) -> Result<Self> {
        let cfg = PoolConfig::from_url(format!("redis://{addr}"));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| OrbError::Dedup(format!("redis pool: {e}")))?;
        Ok(Self {
            pool,
            ttl_secs: ttl.as_secs().max(1),
            metrics,
        })
    }

    pub async fn seen(&self, key: &str) -> bool {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "dedup backend unavailable, failing open");
                Metrics::incr(&self.metrics.dedup_errors);
                return false;
            }
        };

        // SET NX returns OK when the key was absent, nil when present
        let result: std::result::Result<Option<String>, _> = deadpool_redis::redis::cmd("SET")
            .arg(format!("seen:{key}"))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, key, "dedup SET failed, failing open");
                Metrics::incr(&self.metrics.dedup_errors);
                false
            }
        }
    }
}
