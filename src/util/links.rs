use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to localhost or a private network.
    #[error("Internal address not allowed: {0}")]
    InternalHost(String),
}

/// Validates a URL before it is registered as a site's feed.
///
/// Rejects non-HTTP(S) schemes, `localhost`, and loopback/private/link-local
/// IP literals so an imported OPML file cannot point the worker at internal
/// services.
///
/// # Examples
///
/// ```
/// use feedmill::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::InternalHost(host.to_owned()));
        }

        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            if is_internal_ip(&ip) {
                return Err(UrlValidationError::InternalHost(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // fc00::/7
                || (first & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

/// Host part of a URL, lowercased; empty when the URL has no host or does not parse.
pub fn host_name(url_str: &str) -> String {
    Url::parse(url_str.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

/// Resolve an `href` against the page URL it appeared on.
///
/// A missing href resolves to the page itself. When the base does not parse
/// the href is returned unchanged.
pub fn resolve_href(base: &str, href: Option<&str>) -> String {
    let href = href.map(str::trim).unwrap_or("");
    match Url::parse(base) {
        Ok(base_url) => match base_url.join(href) {
            Ok(joined) => joined.to_string(),
            Err(_) => href.to_string(),
        },
        Err(_) => href.to_string(),
    }
}
