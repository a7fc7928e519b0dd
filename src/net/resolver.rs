//! One-shot hostname resolution for record enrichment.
//!
//! Each call hits the system resolver directly; results are not cached.
//! IPv4 addresses are preferred so that recorded destinations stay stable
//! across dual-stack hosts.

use std::net::IpAddr;
use tokio::net::lookup_host;

use crate::error::ResolveError;

pub async fn resolve(host: &str) -> Result<IpAddr, ResolveError> {
    // lookup_host needs a port; it is discarded along with everything but
    // the address list.
    let addrs: Vec<_> = lookup_host((host, 0))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .map(|a| a.ip())
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().map(|a| a.ip()))
        .ok_or_else(|| ResolveError::NoAddress(host.to_string()))
}
