//! Outbound-link extraction from root pages
//!
//! Only hostnames leave this module. The pipeline wants to know which
//! *other* operations a page points at, so links are reduced to their
//! hosts and filtered down to those whose apex differs from the page's
//! own.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::url::apex;

/// Tags inspected for outbound references and the attribute each carries
const LINK_ATTRS: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("script", "src"),
    ("img", "src"),
    ("iframe", "src"),
    ("source", "src"),
];

/// Extracts external hostnames from an HTML body
///
/// The body must already be size-capped by the caller. Relative references
/// inherit `https://{base_host}/`. A hostname is external iff its apex
/// differs from the base host's apex. The result keeps first-occurrence
/// document order with duplicates removed; anything unparseable is
/// silently skipped.
pub fn external_domains(base_host: &str, html: &str) -> Vec<String> {
    let base = match Url::parse(&format!("https://{base_host}/")) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let base_apex = apex(base_host);

    // One combined selector keeps traversal in document order
    let selector = match Selector::parse("a, link, script, img, iframe, source") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for element in document.select(&selector) {
        let tag = element.value().name();
        let Some((_, attr)) = LINK_ATTRS.iter().find(|(t, _)| *t == tag) else {
            continue;
        };
        let Some(value) = element.value().attr(attr) else {
            continue;
        };
        let Ok(resolved) = base.join(value.trim()) else {
            continue;
        };
        let Some(host) = resolved.host_str() else {
            continue;
        };

        let host = host.to_lowercase();
        if apex(&host) == base_apex {
            continue;
        }
        if seen.insert(host.clone()) {
            out.push(host);
        }
    }

    out
}
