use std::path::Path;

use chrono::Utc;

use crate::config::types::Config;
use crate::config::validation::validate_config;
use crate::ConfigResult;

/// Values captured from the command line that override the config file
///
/// `None` means the flag was not given and the file value (or default)
/// stands. Collected by `main` from clap and applied here so precedence
/// lives in one place.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub domains: Option<String>,
    pub probe: Option<String>,
    pub run: Option<String>,
    pub ua: Option<String>,
    pub exclude_tlds: Option<String>,
    pub concurrency: Option<usize>,
    pub ingest: Option<String>,
    pub batch_max_edges: Option<usize>,
    pub batch_flush_sec: Option<u64>,
    pub spool_dir: Option<String>,
    pub mtls_cert: Option<String>,
    pub mtls_key: Option<String>,
    pub mtls_ca: Option<String>,
}

/// Loads configuration from an optional TOML file, the environment, and
/// command-line overrides
///
/// Precedence: CLI flags > config file > defaults. Redis endpoints come
/// from the environment only. The returned config has passed validation.
pub fn load_config(file: Option<&Path>, cli: CliOverrides) -> ConfigResult<Config> {
    let mut config = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&raw)?
        }
        None => Config::default(),
    };

    apply_env(&mut config);
    apply_cli(&mut config, cli);

    if config.run.is_empty() {
        config.run = format!("run-{}", Utc::now().timestamp());
    }

    validate_config(&config)?;
    Ok(config)
}

fn apply_env(config: &mut Config) {
    if let Ok(v) = std::env::var("REDIS_ADDR") {
        if !v.is_empty() {
            config.redis_addr = v;
        }
    }
    if let Ok(v) = std::env::var("REDIS_QUEUE_ADDR") {
        if !v.is_empty() {
            config.redis_queue_addr = v;
        }
    }
    if let Ok(v) = std::env::var("REDIS_QUEUE_KEY") {
        if !v.is_empty() {
            config.redis_queue_key = v;
        }
    }
}

fn apply_cli(config: &mut Config, cli: CliOverrides) {
    if let Some(v) = cli.domains {
        config.domains = v;
    }
    if let Some(v) = cli.probe {
        config.probe = v;
    }
    if let Some(v) = cli.run {
        config.run = v;
    }
    if let Some(v) = cli.ua {
        config.ua = v;
    }
    if let Some(v) = cli.exclude_tlds {
        config.exclude_tlds = v
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    if let Some(v) = cli.concurrency {
        config.concurrency = v;
    }
    if let Some(v) = cli.ingest {
        config.ingest = v;
    }
    if let Some(v) = cli.batch_max_edges {
        config.batch_max_edges = v;
    }
    if let Some(v) = cli.batch_flush_sec {
        config.batch_flush_sec = v;
    }
    if let Some(v) = cli.spool_dir {
        config.spool_dir = v;
    }
    if let Some(v) = cli.mtls_cert {
        config.mtls_cert = v;
    }
    if let Some(v) = cli.mtls_key {
        config.mtls_key = v;
    }
    if let Some(v) = cli.mtls_ca {
        config.mtls_ca = v;
    }
}
