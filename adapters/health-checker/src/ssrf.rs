//! Outbound target validation for health probes.

use std::net::{IpAddr, SocketAddr};

use domain::validate::{is_blocked_ip, validate_url};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

pub const BLOCKED_MESSAGE: &str = "URL points to a private or reserved IP address";

/// A connection was about to be made to a blocked address.
#[derive(Debug, thiserror::Error)]
#[error("URL points to a private or reserved IP address")]
pub struct BlockedAddress;

/// Hostnames that always point at the local machine.
fn is_local_name(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost")
}

/// Reject a probe target by its literal host, without DNS.
pub fn check_literal(url: &Url) -> Result<(), String> {
    match url.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ip(IpAddr::V4(ip)) => Err(BLOCKED_MESSAGE.into()),
        Some(Host::Ipv6(ip)) if is_blocked_ip(IpAddr::V6(ip)) => Err(BLOCKED_MESSAGE.into()),
        Some(Host::Domain(name)) if is_local_name(name) => Err(BLOCKED_MESSAGE.into()),
        Some(_) => Ok(()),
        None => Err("URL must have a host".into()),
    }
}

/// Validate a URL before probing it: http(s) scheme, a host, and no
/// resolved address in a loopback, private, link-local or metadata range.
/// The error is the message stored as the link's health error.
pub async fn validate_for_health_check(raw: &str) -> Result<Url, String> {
    let url = validate_url(raw).map_err(|e| match e {
        domain::CoreError::InvalidUrl(msg) => msg,
        other => other.to_string(),
    })?;
    check_literal(&url)?;
    if let Some(Host::Domain(host)) = url.host() {
        let port = url.port_or_known_default().unwrap_or(80);
        let resolved = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| format!("failed to resolve host {host}: {e}"))?;
        let mut any = false;
        for addr in resolved {
            any = true;
            if is_blocked_ip(addr.ip()) {
                return Err(BLOCKED_MESSAGE.into());
            }
        }
        if !any {
            return Err(format!("host {host} did not resolve to any address"));
        }
    }
    Ok(url)
}

/// Drop the whole answer when any address is blocked, like the pre-check.
fn screen(
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<Vec<SocketAddr>, BlockedAddress> {
    let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
    if addrs.iter().any(|a| is_blocked_ip(a.ip())) {
        return Err(BlockedAddress);
    }
    Ok(addrs)
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn resolve_screened(host: &str) -> Result<Vec<SocketAddr>, BoxError> {
    if is_local_name(host) {
        return Err(Box::new(BlockedAddress));
    }
    let resolved = tokio::net::lookup_host((host, 0)).await?;
    Ok(screen(resolved)?)
}

/// DNS resolver for the health-check client. Every connection, redirects included,
/// resolves through here, so a name that resolves to a private address
/// after the pre-check still never gets a connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreeningResolver;

impl Resolve for ScreeningResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_owned();
        Box::pin(async move {
            let addrs = resolve_screened(&host).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
