use std::net::IpAddr;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::ResolveError;
use crate::validation::Target;

/// Turn a target into the address to scan. Literals pass through untouched;
/// hostnames go through the system resolver, preferring an IPv4 answer.
pub async fn resolve(target: &Target) -> Result<IpAddr, ResolveError> {
    if let Some(ip) = target.literal() {
        return Ok(ip);
    }

    let host = target.to_string();
    let addrs: Vec<IpAddr> = lookup_host((host.as_str(), 0))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: host.clone(),
            source,
        })?
        .map(|addr| addr.ip())
        .collect();

    debug!(host = %host, answers = addrs.len(), "resolved");

    pick_address(&addrs).ok_or(ResolveError::NotFound(host))
}

fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}
