//! Relay address validation
//!
//! The relay is reached over WebSocket, so addresses must:
//! - Be properly formatted
//! - Use the `ws` or `wss` scheme
//! - Name a host
//!
//! Plain `ws://` is accepted everywhere but logged when the host is not a
//! local or private address, since the session then travels unencrypted.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be ws or wss, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Checks if an IPv4 address is loopback, private or link-local
fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

/// Checks if an IPv6 address is loopback, unique-local or link-local
fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();

    // Link-local (fe80::/10)
    if segments[0] & 0xFFC0 == 0xFE80 {
        return true;
    }

    // Unique local address (fc00::/7)
    if segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }

    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&ipv4);
    }

    false
}

/// Checks if an IP address is private/internal
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_local_host(parsed: &Url) -> bool {
    match parsed.host() {
        Some(url::Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
        }
        Some(url::Host::Ipv4(ip)) => is_private_ip(&IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => is_private_ip(&IpAddr::V6(ip)),
        None => false,
    }
}

/// Validates a relay WebSocket address
///
/// # Returns
/// * `Ok(Url)` with the parsed address
/// * `Err(UrlValidationError)` if the address cannot be used
///
/// # Example
/// ```rust,ignore
/// use live_session::utils::url_validation::validate_ws_url;
///
/// assert!(validate_ws_url("ws://localhost:8081").is_ok());
/// assert!(validate_ws_url("wss://relay.example.com/live").is_ok());
/// assert!(validate_ws_url("https://relay.example.com").is_err());
/// ```
pub fn validate_ws_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    let scheme = parsed.scheme();
    if scheme != "ws" && scheme != "wss" {
        return Err(UrlValidationError::UnsupportedScheme(scheme.to_string()));
    }

    let host = parsed.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlValidationError::MissingHost);
    }

    if scheme == "ws" && !is_local_host(&parsed) {
        warn!(host = %host, "Relay address uses unencrypted ws:// for a public host");
    }

    Ok(parsed)
}
