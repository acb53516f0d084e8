/// Normalizes a raw hostname for use as a graph identifier
///
/// Lowercases and strips any trailing dots (DNS answers frequently carry
/// the root dot). Surrounding whitespace is trimmed so file input can be
/// fed through directly. The result is what every dedup key, node, and
/// edge identifier is built from.
pub fn normalize_host(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}
