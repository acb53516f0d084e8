use crate::config::types::Config;
use crate::{ConfigError, ConfigResult};

/// Validates a fully merged configuration
///
/// These are the only fatal errors in the system: everything past startup
/// recovers locally, so anything wrong enough to refuse to run must be
/// caught here.
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    if config.domains.is_empty() && !config.queue_enabled() {
        return Err(ConfigError::Validation(
            "either a domains file or REDIS_QUEUE_ADDR is required".to_string(),
        ));
    }
    if config.concurrency == 0 {
        return Err(ConfigError::Validation(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if config.batch_max_edges == 0 {
        return Err(ConfigError::Validation(
            "batch_max_edges must be at least 1".to_string(),
        ));
    }
    if config.batch_flush_sec == 0 {
        return Err(ConfigError::Validation(
            "batch_flush_sec must be at least 1".to_string(),
        ));
    }
    if config.rate_per_sec <= 0.0 {
        return Err(ConfigError::Validation(
            "rate_per_sec must be positive".to_string(),
        ));
    }

    // mTLS is all-or-nothing for the cert/key pair
    let has_cert = !config.mtls_cert.is_empty();
    let has_key = !config.mtls_key.is_empty();
    if has_cert != has_key {
        return Err(ConfigError::InvalidTls(
            "mtls_cert and mtls_key must be provided together".to_string(),
        ));
    }

    if config.sink_enabled() {
        ::url::Url::parse(&config.ingest)
            .map_err(|e| ConfigError::Validation(format!("invalid ingest URL: {e}")))?;
    }

    Ok(())
}
