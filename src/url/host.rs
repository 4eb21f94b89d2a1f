use url::Url;

/// Returns the key the host rate limiter uses for a URL
///
/// The key is the lowercase host plus an explicit port when one is present,
/// so two servers on the same machine are paced independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_archive::url::host_key;
///
/// let url = Url::parse("https://EXAMPLE.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
