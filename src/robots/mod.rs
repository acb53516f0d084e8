//! robots.txt policy: fetching, caching, and evaluation
//!
//! The probe only ever fetches `/`, but it still asks first. Robots data
//! is cached per host with a 24-hour shelf life; anything that prevents a
//! definitive answer (network trouble, odd status codes) degrades to
//! allow-all, because a recon probe that stalls on missing robots files
//! would never get anywhere.

mod cache;
mod rules;

pub use cache::{CachedRobots, RobotsCache};
pub use rules::{skip_by_tld, RobotsRules};
