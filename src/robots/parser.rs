//! Robots.txt parser implementation
//!
//! Path matching is delegated to the robotstxt crate; `Crawl-delay` is not
//! covered by it and is parsed here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty means allow all)
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Builds rules for all agents from a list of disallowed path prefixes
    /// and an optional crawl delay
    ///
    /// # Example
    ///
    /// ```
    /// use ripple_crawl::robots::ParsedRobots;
    /// use std::time::Duration;
    ///
    /// let robots = ParsedRobots::from_disallow_prefixes(&["/private"], Some(Duration::from_secs(2)));
    /// assert!(!robots.is_allowed("http://a.test/private/page", "RippleBot"));
    /// assert_eq!(robots.crawl_delay("RippleBot"), Some(Duration::from_secs(2)));
    /// ```
    pub fn from_disallow_prefixes(prefixes: &[&str], crawl_delay: Option<Duration>) -> Self {
        let mut content = String::from("User-agent: *\n");
        for prefix in prefixes {
            content.push_str(&format!("Disallow: {}\n", prefix));
        }
        if let Some(delay) = crawl_delay {
            content.push_str(&format!("Crawl-delay: {}\n", delay.as_secs_f64()));
        }
        Self { content }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// `url` may be a full URL or a path (e.g. "/page.html").
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A delay declared in a group naming the agent wins over the wildcard
    /// group. Consecutive `User-agent` lines form one group; any other
    /// directive closes it.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.content.is_empty() {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut for_wildcard: Option<f64> = None;
        let mut for_agent: Option<f64> = None;

        for line in self.content.lines() {
            // Strip trailing comments
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !in_agent_lines {
                    group.clear();
                }
                group.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }

            if group
                .iter()
                .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
            {
                for_agent = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                for_wildcard = Some(delay);
            }
        }

        for_agent.or(for_wildcard).map(Duration::from_secs_f64)
    }
}
