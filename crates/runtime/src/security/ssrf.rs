//! SSRF guard for outbound URLs
//!
//! Lexical validation only: hostnames are inspected as written, never
//! resolved. Rejects URLs whose host is a loopback, private, link-local,
//! CGNAT, unique-local or metadata address, strips credentials and
//! fragments, and normalizes the result. Every outbound request in the
//! runtime goes through [`SsrfGuard::validate_and_sanitize`] first.

use crate::config::Config;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

#[derive(Debug, Clone)]
pub struct SsrfGuard {
    protection_enabled: bool,
    allowed_hosts: Option<Vec<String>>,
}

impl SsrfGuard {
    pub fn new(protection_enabled: bool, allowed_hosts: Option<Vec<String>>) -> Self {
        Self {
            protection_enabled,
            allowed_hosts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ssrf_protection, config.allowed_hosts.clone())
    }

    /// Validate a raw URL and return the normalized absolute form, or
    /// `None` if it must not be fetched.
    ///
    /// Scheme and allowlist checks always apply; the address-class
    /// checks honor the protection switch.
    pub fn validate_and_sanitize(&self, raw: &str) -> Option<String> {
        let mut url = Url::parse(raw.trim()).ok()?;

        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        // Credentials in URLs are a redirect-smuggling vector.
        url.set_username("").ok()?;
        url.set_password(None).ok()?;
        url.set_fragment(None);

        let host = url.host()?.to_owned();

        if let Some(allow) = &self.allowed_hosts {
            let name = host_name(&host);
            if !allow.iter().any(|h| h == &name) {
                return None;
            }
        }

        if self.protection_enabled && !host_is_public(&host) {
            return None;
        }

        Some(url.to_string())
    }
}

fn host_name(host: &Host) -> String {
    match host {
        Host::Domain(d) => d.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn host_is_public(host: &Host) -> bool {
    match host {
        Host::Ipv4(ip) => ipv4_is_public(*ip),
        Host::Ipv6(ip) => ipv6_is_public(*ip),
        Host::Domain(name) => domain_is_public(name),
    }
}

fn domain_is_public(name: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if name == "localhost" || name == "metadata.google.internal" {
        return false;
    }
    if name.ends_with(".localhost") || name.ends_with(".local") || name.ends_with(".internal") {
        return false;
    }
    true
}

fn ipv4_is_public(ip: Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast() {
        return false;
    }
    let octets = ip.octets();
    let blocked = octets[0] == 0
        || octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 169 && octets[1] == 254)
        || (octets[0] == 100 && (64..=127).contains(&octets[1]));
    !blocked
}

fn ipv6_is_public(ip: Ipv6Addr) -> bool {
    // IPv4-mapped and IPv4-compatible forms must not bypass the v4 rules.
    if let Some(v4) = ip.to_ipv4_mapped().or_else(|| ip.to_ipv4()) {
        return ipv4_is_public(v4);
    }
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }
    let segments = ip.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    !(unique_local || link_local)
}
