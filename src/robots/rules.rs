//! Parsed robots.txt rules and TLD exclusion policy

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one host
///
/// A thin wrapper over the robotstxt crate: the raw content is kept and
/// matched on demand. An empty or explicitly permissive instance allows
/// everything.
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty means allow all)
    content: String,
    allow_all: bool,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// The permissive default used when robots.txt cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks whether `path` is allowed for `user_agent`
    ///
    /// Group selection follows the robots.txt convention: the group
    /// matching the user agent, else the `*` group, else allow.
    pub fn allowed(&self, user_agent: &str, path: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, path)
    }
}

/// Whether policy excludes `host` from HTTP and TLS probing entirely
///
/// True iff the normalized host equals an excluded TLD or ends with
/// `.{tld}`. DNS contributions are unaffected; only the fetch path is.
pub fn skip_by_tld(host: &str, excluded: &[String]) -> bool {
    excluded
        .iter()
        .any(|tld| host == tld || host.ends_with(&format!(".{tld}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let rules = RobotsRules::allow_all();
        assert!(rules.allowed("TestBot", "/"));
        assert!(rules.allowed("TestBot", "/admin"));
    }

    #[test]
    fn test_disallow_all() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /");
        assert!(!rules.allowed("TestBot", "/"));
        assert!(!rules.allowed("TestBot", "/page"));
    }

    #[test]
    fn test_disallow_specific_path() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /admin");
        assert!(rules.allowed("TestBot", "/"));
        assert!(!rules.allowed("TestBot", "/admin"));
        assert!(!rules.allowed("TestBot", "/admin/users"));
    }

    #[test]
    fn test_specific_agent_group_wins() {
        let rules =
            RobotsRules::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(rules.allowed("GoodBot", "/"));
        assert!(!rules.allowed("BadBot", "/"));
    }

    #[test]
    fn test_empty_content_allows() {
        let rules = RobotsRules::from_content("");
        assert!(rules.allowed("TestBot", "/anything"));
    }

    #[test]
    fn test_skip_by_tld_suffix_match() {
        let excluded = vec!["gov".to_string(), "mil".to_string(), "int".to_string()];
        assert!(skip_by_tld("something.gov", &excluded));
        assert!(skip_by_tld("deep.sub.army.mil", &excluded));
        assert!(!skip_by_tld("example.com", &excluded));
    }

    #[test]
    fn test_skip_by_tld_exact_match() {
        let excluded = vec!["gov".to_string()];
        assert!(skip_by_tld("gov", &excluded));
    }

    #[test]
    fn test_skip_by_tld_no_partial_label_match() {
        let excluded = vec!["gov".to_string()];
        // "xgov" is not the gov TLD
        assert!(!skip_by_tld("example.xgov", &excluded));
        assert!(!skip_by_tld("governance.example", &excluded));
    }
}
