use crate::{UrlError, UrlResult};
use url::Url;

/// Normalizes a URL string into its canonical form
///
/// The canonical form is the dedup key of the crawl, so this function must be
/// deterministic and idempotent: `normalize_url(normalize_url(u)) == normalize_url(u)`.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but `http` and `https`
/// 3. Lowercase the scheme and host
/// 4. Drop the port when it is the scheme's default
/// 5. Remove the fragment
/// 6. Sort query parameters by key (stable, so repeated keys keep their order)
/// 7. Remove an empty query string (trailing `?`)
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/page?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Normalizes an already parsed URL
///
/// Used for links that were resolved against a base URL, where re-parsing
/// the string form would be wasted work.
pub fn canonicalize(mut url: Url) -> UrlResult<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // The url crate lowercases scheme and domain hosts and drops default
    // ports while parsing special schemes; only the empty-host case is left.
    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params.iter());
        }
    }

    Ok(url)
}

/// Decodes the query and sorts the pairs by key
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}
