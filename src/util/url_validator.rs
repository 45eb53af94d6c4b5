use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// These cover parsing failures and the host policy applied before the
/// service issues requests to URLs taken from feed content.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Parses an absolute http(s) URL as found in feed content.
///
/// Surrounding whitespace is ignored; relative references and other schemes
/// are rejected.
///
/// # Examples
///
/// ```
/// use reaper::util::parse_http_url;
///
/// assert!(parse_http_url(" https://example.com/post/1 ").is_ok());
/// assert!(parse_http_url("/post/1").is_err());
/// assert!(parse_http_url("mailto:editor@example.com").is_err());
/// ```
pub fn parse_http_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Checks that a URL may be requested by the image resolver.
///
/// Rejects localhost, loopback and private/link-local addresses so that
/// URLs mined from third-party feed text cannot reach internal services.
/// `allow_private_hosts` lifts the host restriction (used for local
/// deployments and tests); the scheme check always applies.
///
/// # Examples
///
/// ```
/// use reaper::util::validate_url;
/// use url::Url;
///
/// let public = Url::parse("https://example.com/a.png").unwrap();
/// assert!(validate_url(&public, false).is_ok());
///
/// let internal = Url::parse("http://192.168.1.1/a.png").unwrap();
/// assert!(validate_url(&internal, false).is_err());
/// assert!(validate_url(&internal, true).is_ok());
/// ```
pub fn validate_url(url: &Url, allow_private_hosts: bool) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if allow_private_hosts {
        return Ok(());
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
