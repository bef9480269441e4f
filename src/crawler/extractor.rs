//! HTML parsing and link extraction
//!
//! Parsing happens once per document and yields plain owned data, so nothing
//! borrowed from the DOM has to live across an `.await`. Link resolution and
//! canonicalization are deferred to [`ExtractedLinks`], a lazy iterator the
//! coordinator consumes exactly once.

use crate::url::canonicalize;
use scraper::{Html, Selector};
use url::Url;

/// Information extracted from one HTML document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// The page title (from the <title> tag)
    pub title: Option<String>,

    /// Visible text, whitespace collapsed
    pub text: String,

    /// `<base href>`, if the document declares one
    pub base_href: Option<String>,

    /// Raw link targets in document order, unresolved
    pub hrefs: Vec<String>,
}

/// HTML parsing capability
pub trait DocumentParser: Send + Sync {
    fn parse(&self, html: &str) -> ParsedDocument;
}

/// [`DocumentParser`] backed by scraper
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links
///
/// `rel="nofollow"` links are followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn parse(&self, html: &str) -> ParsedDocument {
        let document = Html::parse_document(html);

        ParsedDocument {
            title: extract_title(&document),
            text: extract_text(&document),
            base_href: extract_base_href(&document),
            hrefs: extract_hrefs(&document),
        }
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_base_href(document: &Html) -> Option<String> {
    let selector = Selector::parse("base[href]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Collects text nodes outside of <head>, <script>, <style> and <noscript>
fn extract_text(document: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().map_or(false, |element| {
                matches!(element.name(), "head" | "script" | "style" | "noscript")
            })
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

/// Collects candidate link targets in document order
fn extract_hrefs(document: &Html) -> Vec<String> {
    let mut hrefs = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    hrefs
}

/// Lazy sequence of canonical outbound URLs
///
/// Each href is resolved against the document base and canonicalized only
/// when the iterator is advanced. Hrefs that cannot become a crawlable URL
/// are skipped.
#[derive(Debug)]
pub struct ExtractedLinks {
    hrefs: std::vec::IntoIter<String>,
    base: Url,
}

impl Iterator for ExtractedLinks {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        for href in self.hrefs.by_ref() {
            if let Some(url) = resolve_link(&href, &self.base) {
                return Some(url);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.hrefs.size_hint().1)
    }
}

/// Turns a parsed document into its outbound links
///
/// `final_url` is the post-redirect URL of the document; a `<base href>`
/// overrides it when present and valid.
pub fn extract_links(document: ParsedDocument, final_url: &Url) -> ExtractedLinks {
    let base = document
        .base_href
        .as_deref()
        .and_then(|href| final_url.join(href).ok())
        .unwrap_or_else(|| final_url.clone());

    ExtractedLinks {
        hrefs: document.hrefs.into_iter(),
        base,
    }
}

/// Resolves a link href to a canonical absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    canonicalize(absolute).ok()
}
