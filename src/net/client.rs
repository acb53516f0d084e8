//! Shared HTTP client and its breaker-wrapped front

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::breaker::{BreakerConfig, HostBreakers};
use crate::metrics::Metrics;
use crate::{OrbError, Result};

/// Builds the shared HTTP client used for robots and root-page fetches
///
/// Certificate verification stays on; compression is negotiated like a
/// browser would. Pool knobs bound idle sockets per host so a wide crawl
/// does not hoard file descriptors.
pub fn build_http_client(ua: &str) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(ua)
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(64)
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP client wrapped by per-host circuit breakers
///
/// `get` asks the host's breaker first; an open breaker rejects without
/// touching the network. Transport errors and 5xx responses count as
/// breaker failures; 4xx responses do not, since a 404 is the host
/// answering fine.
pub struct ResilientClient {
    client: Client,
    breakers: HostBreakers,
    metrics: Arc<Metrics>,
}

impl ResilientClient {
    pub fn new(client: Client, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            breakers: HostBreakers::new(BreakerConfig::default()),
            metrics,
        }
    }

    pub fn with_breaker_config(
        client: Client,
        config: BreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            breakers: HostBreakers::new(config),
            metrics,
        }
    }

    /// Issues a GET through the host's breaker
    ///
    /// The response is returned whatever its status; only the breaker
    /// classification distinguishes 5xx from the rest.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let host = ::url::Url::parse(url)?
            .host_str()
            .unwrap_or_default()
            .to_string();

        let breaker = self.breakers.breaker(&host);
        if !breaker.try_acquire() {
            Metrics::incr(&self.metrics.breaker_rejected);
            return Err(OrbError::BreakerOpen { host });
        }

        match self.client.get(url).send().await {
            Ok(response) => {
                breaker.record(!response.status().is_server_error());
                Ok(response)
            }
            Err(source) => {
                breaker.record(false);
                Err(OrbError::Http {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    /// Breaker state access for observability and operator resets
    pub fn breakers(&self) -> &HostBreakers {
        &self.breakers
    }
}
