//! Input validation helpers. Keep logic minimal and deterministic; anything
//! that needs DNS lives in the health-checker crate.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::CoreError;

pub const MAX_KEYWORD_LEN: usize = 100;

/// Keywords that collide with fixed routes.
pub const RESERVED_KEYWORDS: &[&str] = &["random"];

/// Cloud metadata endpoints (AWS/GCP/Azure IMDS, Azure wireserver).
pub const METADATA_ADDRS: [Ipv4Addr; 2] = [
    Ipv4Addr::new(169, 254, 169, 254),
    Ipv4Addr::new(168, 63, 129, 16),
];

/// Validate a raw keyword: non-empty, at most 100 chars, `[A-Za-z0-9_-]` only,
/// and not a reserved word.
pub fn validate_keyword(s: &str) -> Result<(), CoreError> {
    if s.is_empty() {
        return Err(CoreError::InvalidKeyword("keyword is required".into()));
    }
    if s.chars().count() > MAX_KEYWORD_LEN {
        return Err(CoreError::InvalidKeyword(format!(
            "keyword must be at most {MAX_KEYWORD_LEN} characters"
        )));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidKeyword(
            "keyword may only contain letters, digits, hyphens and underscores".into(),
        ));
    }
    let lower = normalize_keyword(s);
    if RESERVED_KEYWORDS.contains(&lower.as_str()) {
        return Err(CoreError::InvalidKeyword(format!("'{lower}' is reserved")));
    }
    Ok(())
}

/// Lowercase form used for storage and comparison.
pub fn normalize_keyword(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Validate a link target: parses, http/https scheme, non-empty host.
pub fn validate_url(s: &str) -> Result<url::Url, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("url is required".into()));
    }
    let parsed =
        url::Url::parse(trimmed).map_err(|e| CoreError::InvalidUrl(format!("invalid URL: {e}")))?;
    // url lowercases the scheme during parsing
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidUrl(
            "URL must use http or https scheme".into(),
        ));
    }
    match parsed.host_str() {
        Some(h) if !h.is_empty() => Ok(parsed),
        _ => Err(CoreError::InvalidUrl("URL must have a host".into())),
    }
}

/// True for loopback, link-local, private, unspecified and metadata addresses.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(mapped) => is_blocked_v4(mapped),
            None => is_blocked_v6(v6),
        },
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || METADATA_ADDRS.contains(&ip)
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        || embedded_v4(ip).is_some_and(is_blocked_v4)
}

/// IPv4 address carried in the low 32 bits of a NAT64 (`64:ff9b::/96`) or
/// deprecated IPv4-compatible (`::a.b.c.d`) address.
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let seg = ip.segments();
    let nat64 = seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0];
    let compat = seg[..6] == [0; 6];
    if !(nat64 || compat) {
        return None;
    }
    let [.., a, b, c, d] = ip.octets();
    Some(Ipv4Addr::new(a, b, c, d))
}

/// Parse a path id.
pub fn parse_id(s: &str) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(s).map_err(|_| CoreError::InvalidInput(format!("invalid id '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_rules() {
        assert!(validate_keyword("docs").is_ok());
        assert!(validate_keyword("Team_Wiki-2").is_ok());
        assert!(validate_keyword("").is_err());
        assert!(validate_keyword("has space").is_err());
        assert!(validate_keyword("slash/y").is_err());
        assert!(validate_keyword("ünicode").is_err());
        assert!(validate_keyword(&"a".repeat(100)).is_ok());
        assert!(validate_keyword(&"a".repeat(101)).is_err());
    }

    #[test]
    fn random_is_reserved_in_any_case() {
        assert!(validate_keyword("random").is_err());
        assert!(validate_keyword("RANDOM").is_err());
        assert!(validate_keyword("randomize").is_ok());
    }

    #[test]
    fn normalize_is_idempotent() {
        for k in ["Docs", "ALLCAPS", "mixed-Case_1", "already"] {
            let once = normalize_keyword(k);
            assert_eq!(normalize_keyword(&once), once);
        }
    }

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("HTTP://example.com/path?q=1").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("data:text/html,hi").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn blocked_addresses() {
        let blocked = [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "168.63.129.16",
            "0.0.0.0",
            "::1",
            "::",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ];
        for ip in blocked {
            assert!(is_blocked_ip(ip.parse().unwrap()), "{ip} should be blocked");
        }
        for ip in ["93.184.216.34", "8.8.8.8", "2606:4700::1111"] {
            assert!(!is_blocked_ip(ip.parse().unwrap()), "{ip} should be allowed");
        }
    }

    #[test]
    fn embedded_v4_addresses_are_checked() {
        for ip in [
            "64:ff9b::a9fe:a9fe",
            "64:ff9b::7f00:1",
            "64:ff9b::10.0.0.1",
            "::a9fe:a9fe",
            "::127.0.0.1",
            "::192.168.0.10",
        ] {
            assert!(is_blocked_ip(ip.parse().unwrap()), "{ip} should be blocked");
        }
        // public targets behind a NAT64 gateway stay reachable
        for ip in ["64:ff9b::5db8:d822", "64:ff9b::8.8.8.8"] {
            assert!(!is_blocked_ip(ip.parse().unwrap()), "{ip} should be allowed");
        }
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("nope").is_err());
        assert!(parse_id(&uuid::Uuid::new_v4().to_string()).is_ok());
    }
}
