//! Configuration loading and validation
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags, an optional TOML config file, and built-in defaults. Redis
//! endpoints are read from the environment (`REDIS_ADDR`,
//! `REDIS_QUEUE_ADDR`, `REDIS_QUEUE_KEY`) since they are deployment
//! plumbing rather than crawl policy.

mod parser;
mod types;
mod validation;

pub use parser::{load_config, CliOverrides};
pub use types::Config;
pub use validation::validate_config;
