//! Hostname utilities: normalization and apex resolution
//!
//! Every hostname entering the system passes through [`normalize_host`]
//! before anything else looks at it, so downstream components can assume
//! lowercase, no trailing dot. [`apex`] reduces a host to its registrable
//! domain under public suffix rules, which is the unit the link extractor
//! uses to decide whether a link is external.

mod apex;
mod normalize;

pub use apex::apex;
pub use normalize::normalize_host;
