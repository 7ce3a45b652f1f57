use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal address.
    #[error("Internal address not allowed: {0}")]
    InternalHost(String),
}

/// Validates a feed URL supplied by the invoking trigger.
///
/// Feed URLs come from operator configuration, so only the scheme is
/// checked; internal hosts are allowed (self-hosted feeds, test servers).
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    check_scheme(&url)?;
    Ok(url)
}

/// Validates an article link taken from a feed entry.
///
/// Links are feed-controlled, and the link is handed to the content
/// extraction service, so on top of the scheme check this rejects
/// localhost, loopback, private, link-local and unspecified addresses.
///
/// # Examples
///
/// ```
/// use feedsync::util::validate_link;
///
/// assert!(validate_link("https://example.com/post/1").is_ok());
/// assert!(validate_link("http://localhost/admin").is_err());
/// assert!(validate_link("http://10.0.0.1/post").is_err());
/// assert!(validate_link("file:///etc/passwd").is_err());
/// ```
pub fn validate_link(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    check_scheme(&url)?;

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

fn check_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                return true;
            }
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
