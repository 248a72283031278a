//! SSRF protection for outbound feed requests.
//!
//! Every URL the fetcher is about to request (the operator-supplied one and
//! every redirect target) goes through [`AddressGuard::vet`]. The guard
//! resolves the host itself, rejects non-public addresses, and hands back
//! the vetted addresses so the connection can be pinned to them.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use url::{Host, Url};

use crate::rss::failure::{FailureReason, FetchFailure, FetchResult};

/// Hostname suffixes that only make sense on internal networks.
const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".localhost",
    ".local",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

/// Hostname resolution seam.
pub trait Resolve: Send + Sync {
    /// Resolve `host` to its IP addresses.
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>>;
}

/// Resolver backed by the system's resolver through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        async move {
            let addrs = tokio::net::lookup_host((host, port)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        }
        .boxed()
    }
}

/// A URL that passed validation, with the addresses it may connect to.
#[derive(Debug, Clone)]
pub struct VettedTarget {
    /// Domain name to pin, or `None` for IP-literal hosts.
    pub domain: Option<String>,
    /// Vetted socket addresses.
    pub addrs: Vec<SocketAddr>,
}

/// Validates request targets before any connection is made.
#[derive(Clone)]
pub struct AddressGuard {
    resolver: Arc<dyn Resolve>,
    is_blocked: fn(&IpAddr) -> bool,
}

impl AddressGuard {
    /// Create a guard using the given resolver and the standard blocklist.
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self {
            resolver,
            is_blocked: is_private_ip,
        }
    }

    /// Replace the address predicate. Lets tests reach a loopback fixture.
    #[cfg(test)]
    pub(crate) fn with_blocklist(mut self, is_blocked: fn(&IpAddr) -> bool) -> Self {
        self.is_blocked = is_blocked;
        self
    }

    /// Validate a URL's host and return the addresses it resolves to.
    ///
    /// Fails with `private_ip` when the host is forbidden, cannot be
    /// resolved, resolves to nothing, or any address is non-public.
    pub async fn vet(&self, url: &Url) -> FetchResult<VettedTarget> {
        let port = url.port_or_known_default().ok_or_else(|| {
            FetchFailure::new(FailureReason::InvalidUrl, format!("no port for URL: {url}"))
        })?;

        match url.host() {
            None => Err(FetchFailure::new(
                FailureReason::InvalidUrl,
                "URL has no host",
            )),
            Some(Host::Ipv4(ipv4)) => self.vet_literal(IpAddr::V4(ipv4), port),
            Some(Host::Ipv6(ipv6)) => self.vet_literal(IpAddr::V6(ipv6), port),
            Some(Host::Domain(domain)) => {
                if is_forbidden_hostname(domain) {
                    return Err(FetchFailure::new(
                        FailureReason::PrivateIp,
                        format!("forbidden host: {domain}"),
                    ));
                }

                let ips = self.resolver.resolve(domain, port).await.map_err(|e| {
                    FetchFailure::new(
                        FailureReason::PrivateIp,
                        format!("could not resolve {domain}: {e}"),
                    )
                })?;

                if ips.is_empty() {
                    return Err(FetchFailure::new(
                        FailureReason::PrivateIp,
                        format!("{domain} resolved to no addresses"),
                    ));
                }

                if let Some(ip) = ips.iter().find(|ip| (self.is_blocked)(ip)) {
                    return Err(FetchFailure::new(
                        FailureReason::PrivateIp,
                        format!("{domain} resolves to private address {ip}"),
                    ));
                }

                Ok(VettedTarget {
                    domain: Some(domain.to_string()),
                    addrs: ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect(),
                })
            }
        }
    }

    fn vet_literal(&self, ip: IpAddr, port: u16) -> FetchResult<VettedTarget> {
        if (self.is_blocked)(&ip) {
            return Err(FetchFailure::new(
                FailureReason::PrivateIp,
                format!("private IP address not allowed: {ip}"),
            ));
        }
        Ok(VettedTarget {
            domain: None,
            addrs: vec![SocketAddr::new(ip, port)],
        })
    }
}

impl std::fmt::Debug for AddressGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressGuard").finish_non_exhaustive()
    }
}

/// Parse a feed URL and check its scheme.
pub fn parse_feed_url(raw: &str) -> FetchResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        FetchFailure::new(FailureReason::InvalidUrl, format!("invalid URL: {e}"))
    })?;
    check_scheme(&url)?;
    Ok(url)
}

/// Only http and https are fetched.
pub fn check_scheme(url: &Url) -> FetchResult<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(FetchFailure::new(
            FailureReason::InvalidUrl,
            format!("unsupported URL scheme: {scheme}"),
        )),
    }
}

/// Check if a hostname is reserved for local or internal use.
pub fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    host == "localhost"
        || FORBIDDEN_SUFFIXES
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

/// Check if an IP address is private, loopback, link-local or reserved.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_private()          // 10/8, 172.16/12, 192.168/16
        || ip.is_loopback()  // 127/8
        || ip.is_link_local() // 169.254/16
        || octets[0] == 0    // 0/8 "this network"
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || (octets[0] == 100 && (64..=127).contains(&octets[1])) // 100.64/10 shared address space
        || octets[0] >= 240 // 240/4 reserved
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&mapped);
    }

    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (first & 0xffc0) == 0xfe80 // fe80::/10 link-local
}
