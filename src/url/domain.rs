use url::Url;

/// Extracts the politeness key of a URL: its lowercase host, plus the port
/// when it is not the scheme's default
///
/// Two origins on the same host but different ports are rate limited
/// independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_host(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
