//! Outbound target policy for source links and proxied URLs.
//!
//! Checked twice: cheaply against the literal link (at intake and on every
//! redirect hop), and by [`PublicResolver`] on every connection the HTTP
//! client opens, so the addresses checked are the addresses dialed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use url::{Host, Url};
use utoipa::ToSchema;

/// Which remote targets the service is willing to fetch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Fetch anything, including malformed links (they fail at fetch time)
    AllowAll,
    /// Only http(s) to publicly routable addresses
    #[default]
    DenyPrivate,
    /// Only http(s) to the listed hosts or their subdomains
    AllowList {
        /// Host names, matched case-insensitively
        hosts: Vec<String>,
    },
}

impl TargetPolicy {
    /// Intake-time check of the link text.
    ///
    /// Returns the parsed URL when the policy inspects it, `None` under
    /// [`TargetPolicy::AllowAll`].
    pub fn check_link(&self, link: &str) -> Result<Option<Url>> {
        if *self == TargetPolicy::AllowAll {
            return Ok(None);
        }

        let url = Url::parse(link).map_err(|e| forbidden(link, format!("not a valid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(forbidden(
                link,
                format!("scheme '{}' is not allowed", url.scheme()),
            ));
        }
        let host = url
            .host()
            .ok_or_else(|| forbidden(link, "URL has no host".to_string()))?;

        match self {
            TargetPolicy::AllowAll => {}
            TargetPolicy::DenyPrivate => match host {
                Host::Ipv4(ip) if !is_public(IpAddr::V4(ip)) => {
                    return Err(forbidden(link, format!("{} is not a public address", ip)));
                }
                Host::Ipv6(ip) if !is_public(IpAddr::V6(ip)) => {
                    return Err(forbidden(link, format!("{} is not a public address", ip)));
                }
                Host::Domain(name) if is_local_name(name) => {
                    return Err(forbidden(link, format!("{} is a local host name", name)));
                }
                _ => {}
            },
            TargetPolicy::AllowList { hosts } => {
                let name = host.to_string().to_ascii_lowercase();
                if !hosts.iter().any(|allowed| host_matches(&name, allowed)) {
                    return Err(forbidden(link, format!("{} is not on the allow list", name)));
                }
            }
        }

        Ok(Some(url))
    }
}

/// A lookup answered with an address the policy forbids
#[derive(Debug, Error)]
#[error("{host} resolves to non-public address {address}")]
pub struct BlockedAddress {
    /// Name that was looked up
    pub host: String,
    /// First offending address
    pub address: IpAddr,
}

/// DNS resolver for the HTTP client that refuses non-public answers
///
/// Installed for [`TargetPolicy::DenyPrivate`]. Every connection, including
/// each redirect hop, resolves through it; a lookup with any forbidden address
/// fails as a whole.
#[derive(Clone)]
pub struct PublicResolver {
    overrides: Arc<HashMap<String, Vec<IpAddr>>>,
    allow: fn(IpAddr) -> bool,
}

impl PublicResolver {
    /// Resolve through the system resolver, allowing only public addresses
    pub fn new() -> Self {
        Self {
            overrides: Arc::default(),
            allow: is_public,
        }
    }

    /// Fixed answers for some names and a custom address filter
    #[cfg(test)]
    pub(crate) fn with_overrides(
        overrides: HashMap<String, Vec<IpAddr>>,
        allow: fn(IpAddr) -> bool,
    ) -> Self {
        Self {
            overrides: Arc::new(overrides),
            allow,
        }
    }

    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        match self.overrides.get(host) {
            Some(ips) => Ok(ips.clone()),
            None => Ok(tokio::net::lookup_host((host, 0))
                .await?
                .map(|addr| addr.ip())
                .collect()),
        }
    }

    /// Resolve `host`, failing if any answer is forbidden
    pub async fn resolve_checked(
        &self,
        host: &str,
    ) -> std::result::Result<Vec<IpAddr>, Box<dyn std::error::Error + Send + Sync>> {
        let ips = self.lookup(host).await?;
        if let Some(address) = ips.iter().copied().find(|ip| !(self.allow)(*ip)) {
            tracing::warn!(host, address = %address, "Blocked connection to non-public address");
            return Err(Box::new(BlockedAddress {
                host: host.to_string(),
                address,
            }));
        }
        Ok(ips)
    }
}

impl Default for PublicResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PublicResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicResolver")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl reqwest::dns::Resolve for PublicResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let resolver = self.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            // The connector fills in the port from the URL
            let ips = resolver.resolve_checked(&host).await?;
            let addrs: reqwest::dns::Addrs =
                Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

fn forbidden(target: &str, reason: String) -> Error {
    Error::TargetForbidden {
        target: target.to_string(),
        reason,
    }
}

fn host_matches(host: &str, allowed: &str) -> bool {
    let allowed = allowed.trim_start_matches('.').to_ascii_lowercase();
    host == allowed || host.ends_with(&format!(".{}", allowed))
}

fn is_local_name(name: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    name == "localhost" || name.ends_with(".localhost") || name.ends_with(".local")
}

/// Whether an address is publicly routable
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public_v4(mapped);
            }
            is_public_v6(v6)
        }
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared_cgnat = a == 100 && (64..128).contains(&b);
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared_cgnat
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_accepts_anything() {
        let policy = TargetPolicy::AllowAll;

        assert!(policy.check_link("not a url").unwrap().is_none());
        assert!(policy.check_link("http://127.0.0.1/").unwrap().is_none());
    }

    #[test]
    fn deny_private_rejects_internal_literals() {
        let policy = TargetPolicy::DenyPrivate;

        for link in [
            "http://127.0.0.1/a",
            "http://10.1.2.3/a",
            "http://192.168.0.10/a",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://localhost:8080/",
            "http://printer.local/",
        ] {
            let err = policy.check_link(link).unwrap_err();
            assert!(
                matches!(err, Error::TargetForbidden { .. }),
                "{link} should be forbidden"
            );
        }
    }

    #[test]
    fn deny_private_rejects_other_schemes() {
        let err = TargetPolicy::DenyPrivate
            .check_link("file:///etc/passwd")
            .unwrap_err();

        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn deny_private_accepts_public_links() {
        let url = TargetPolicy::DenyPrivate
            .check_link("https://example.com/a.bin")
            .unwrap()
            .unwrap();

        assert_eq!(url.host_str(), Some("example.com"));
        assert!(TargetPolicy::DenyPrivate
            .check_link("http://93.184.216.34/")
            .is_ok());
    }

    #[test]
    fn allow_list_matches_hosts_and_subdomains() {
        let policy = TargetPolicy::AllowList {
            hosts: vec!["Example.com".into()],
        };

        assert!(policy.check_link("https://example.com/x").is_ok());
        assert!(policy.check_link("https://cdn.example.com/x").is_ok());
        assert!(policy.check_link("https://badexample.com/x").is_err());
        assert!(policy.check_link("https://other.org/x").is_err());
    }

    #[tokio::test]
    async fn resolver_rejects_any_private_answer() {
        let resolver = PublicResolver::with_overrides(
            HashMap::from([(
                "intranet.example".to_string(),
                vec!["93.184.216.34".parse().unwrap(), "10.0.0.5".parse().unwrap()],
            )]),
            is_public,
        );

        let err = resolver.resolve_checked("intranet.example").await.unwrap_err();
        let blocked = err.downcast_ref::<BlockedAddress>().unwrap();
        assert_eq!(blocked.address, "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn resolver_passes_public_answers_through() {
        let resolver = PublicResolver::with_overrides(
            HashMap::from([(
                "cdn.example".to_string(),
                vec!["93.184.216.34".parse().unwrap()],
            )]),
            is_public,
        );

        let ips = resolver.resolve_checked("cdn.example").await.unwrap();
        assert_eq!(ips, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn system_lookup_of_localhost_is_rejected() {
        let err = PublicResolver::new()
            .resolve_checked("localhost")
            .await
            .unwrap_err();

        // A sandbox without a hosts entry fails the lookup itself
        assert!(
            err.downcast_ref::<BlockedAddress>().is_some()
                || err.downcast_ref::<std::io::Error>().is_some(),
            "{err}"
        );
    }

    #[test]
    fn public_address_classification() {
        assert!(is_public("8.8.8.8".parse().unwrap()));
        assert!(is_public("2606:4700::1111".parse().unwrap()));
        assert!(!is_public("0.0.0.0".parse().unwrap()));
        assert!(!is_public("fe80::1".parse().unwrap()));
        assert!(!is_public("224.0.0.1".parse().unwrap()));
    }
}
