//! URL handling for the crawler
//!
//! The crawler deliberately performs no canonicalization beyond removing the
//! fragment and rejecting non-HTTP(S) schemes. This module holds those rules
//! together with seed validation and the host scope filter.

use crate::{UrlError, UrlResult};
use url::Url;

/// Returns true if the URL uses a scheme the crawler can fetch
pub fn is_crawlable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Removes the fragment (`#...`) from a URL
pub fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

/// Returns the host key used for scope comparisons
///
/// The key is the lowercase host followed by `:port` when the URL carries an
/// explicit non-default port, so `http://a.com:8080/` and `http://a.com/` are
/// different hosts.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use depthcrawl::url::host_key;
///
/// let url = Url::parse("https://EXAMPLE.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }

    Some(match url.port() {
        Some(port) => format!("{}:{}", host.to_lowercase(), port),
        None => host.to_lowercase(),
    })
}

/// Parses and validates a seed URL
///
/// The seed must be absolute, use `http` or `https`, and have a non-empty
/// host. Its fragment is removed.
///
/// # Examples
///
/// ```
/// use depthcrawl::url::parse_seed;
///
/// let seed = parse_seed("https://example.com/start#top").unwrap();
/// assert_eq!(seed.as_str(), "https://example.com/start");
///
/// assert!(parse_seed("ftp://example.com/").is_err());
/// assert!(parse_seed("not a url").is_err());
/// ```
pub fn parse_seed(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim())?;

    if !is_crawlable_scheme(&url) {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if host_key(&url).is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(strip_fragment(url))
}

/// Host scope filter applied before a link is admitted
#[derive(Debug, Clone)]
pub struct HostScope {
    start_host: String,
    same_host: bool,
}

impl HostScope {
    /// Creates a scope anchored at `start_host`
    ///
    /// When `same_host` is false every well-formed HTTP(S) link is in scope.
    pub fn new(start_host: impl Into<String>, same_host: bool) -> Self {
        Self {
            start_host: start_host.into(),
            same_host,
        }
    }

    /// Returns true if `link` may be admitted to the frontier
    ///
    /// Unparseable URLs and non-HTTP(S) schemes are always out of scope.
    pub fn allows(&self, link: &str) -> bool {
        let Ok(url) = Url::parse(link) else {
            return false;
        };

        if !is_crawlable_scheme(&url) {
            return false;
        }

        match host_key(&url) {
            Some(host) => !self.same_host || host == self.start_host,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_without_path_gets_root() {
        let seed = parse_seed("http://example.com").unwrap();
        assert_eq!(seed.as_str(), "http://example.com/");
    }

    #[test]
    fn test_seed_rejects_relative_url() {
        assert!(matches!(parse_seed("/just/a/path"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_seed_rejects_mailto() {
        assert!(matches!(
            parse_seed("mailto:someone@example.com"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_host_key_omits_default_port() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(host_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_strip_fragment_keeps_query() {
        let url = Url::parse("https://example.com/a?q=1#section").unwrap();
        assert_eq!(strip_fragment(url).as_str(), "https://example.com/a?q=1");
    }

    #[test]
    fn test_same_host_scope() {
        let scope = HostScope::new("example.com", true);
        assert!(scope.allows("http://example.com/a"));
        assert!(scope.allows("https://EXAMPLE.COM/b"));
        assert!(!scope.allows("http://other.com/x"));
        assert!(!scope.allows("http://sub.example.com/"));
        assert!(!scope.allows("http://example.com:8080/"));
    }

    #[test]
    fn test_open_scope_still_rejects_bad_urls() {
        let scope = HostScope::new("example.com", false);
        assert!(scope.allows("http://other.com/x"));
        assert!(!scope.allows("ftp://other.com/x"));
        assert!(!scope.allows("not a url"));
    }
}
