//! HTML parser for extracting links
//!
//! Every `<a href>` on the page is resolved against the page URL. Only
//! `http` and `https` results are kept, fragments are removed, and the list is
//! deduplicated while preserving encounter order.

use crate::url::{is_crawlable_scheme, strip_fragment};
use crate::ExtractError;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts out-links from a downloaded page
pub trait LinkExtractor: Send + Sync {
    /// Returns the absolute links found in `html`
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Links in encounter order, without duplicates
    /// * `Err(ExtractError::InvalidBase)` - `base_url` is not an absolute URL
    fn parse_links(&self, base_url: &str, html: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// [`LinkExtractor`] built on `scraper`'s permissive HTML5 parser
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkExtractor;

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn parse_links(&self, base_url: &str, html: &[u8]) -> Result<Vec<String>, ExtractError> {
        let base = Url::parse(base_url).map_err(|source| ExtractError::InvalidBase {
            url: base_url.to_string(),
            source,
        })?;

        let html = String::from_utf8_lossy(html);
        Ok(extract_links(&html, &base))
    }
}

/// Extracts links from an HTML document
///
/// # Example
///
/// ```
/// use depthcrawl::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/a#top">A</a><a href="/a">A again</a><a href="mailto:x@y.z">mail</a>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// assert_eq!(extract_links(html, &base), vec!["https://example.com/a".to_string()]);
/// ```
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(absolute) = resolve_link(href, base_url) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - Empty hrefs
/// - Hrefs that fail to resolve against the base
/// - Anything that is not HTTP(S) after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if !is_crawlable_scheme(&absolute) {
        return None;
    }

    Some(strip_fragment(absolute).to_string())
}
