//! Job-application URL validation and ATS detection.
//!
//! Validates a job URL before any automation work begins:
//! - HTTPS only
//! - rejects hosts resolving to loopback/private/link-local space (SSRF)
//! - rejects over-long or malformed URLs
//! - accepts only known ATS domains, or URLs carrying a platform-specific
//!   query marker (covers ATS forms embedded on a company's own domain)
//!
//! Validation is a pure check with no side effects, and a validation
//! failure is always terminal: no browser session is launched for a
//! rejected URL.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{SecurityError, SecurityResult};
use crate::types::ats::AtsType;

/// Maximum accepted URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// A URL that passed validation, with the platform it was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    pub url: String,
    pub ats: AtsType,
}

/// URL validator with SSRF protection and ATS allowlisting.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    /// Blocked hostnames
    blocked_hosts: HashSet<String>,

    /// Blocked CIDR ranges
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Additional allowed hosts (accepted as AtsType::Unknown)
    allowed_hosts: HashSet<String>,

    /// Accept hosts with no ATS attribution (recording tools)
    accept_unknown_hosts: bool,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a validator with the default security rules.
    pub fn new() -> Self {
        Self {
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(), // Link-local / cloud metadata
                "127.0.0.0/8".parse().unwrap(),    // Loopback
                "::1/128".parse().unwrap(),        // IPv6 loopback
                "fc00::/7".parse().unwrap(),       // IPv6 private
                "fe80::/10".parse().unwrap(),      // IPv6 link-local
            ],
            allowed_hosts: HashSet::new(),
            accept_unknown_hosts: false,
        }
    }

    /// Add an allowed host (accepted without ATS attribution).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Accept any safe host, attributing unknown ones to `AtsType::Unknown`.
    /// The SSRF rules still apply.
    pub fn accept_unknown_hosts(mut self) -> Self {
        self.accept_unknown_hosts = true;
        self
    }

    /// Validate a job URL and attribute it to a platform.
    pub fn validate(&self, url: &str) -> SecurityResult<ValidatedUrl> {
        if url.len() > MAX_URL_LENGTH {
            return Err(SecurityError::UrlTooLong(url.len()));
        }

        let parsed = url::Url::parse(url)?;

        // Application URLs are HTTPS only.
        if parsed.scheme() != "https" {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        // Literal IPs in blocked ranges never reach automation.
        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(SecurityError::BlockedCidr(ip.to_string()));
                }
            }
        }

        if let Some(ats) = detect_ats(&parsed) {
            return Ok(ValidatedUrl {
                url: url.to_string(),
                ats,
            });
        }

        if self.allowed_hosts.contains(host) || self.accept_unknown_hosts {
            return Ok(ValidatedUrl {
                url: url.to_string(),
                ats: AtsType::Unknown,
            });
        }

        Err(SecurityError::UnrecognizedHost(host.to_string()))
    }

    /// Validate and resolve DNS to check actual IPs against blocked CIDRs.
    ///
    /// Catches DNS rebinding, where a public hostname resolves to an
    /// internal address.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<ValidatedUrl> {
        let validated = self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        // Literal IPs were already checked in validate.
        if host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok() {
            return Ok(validated);
        }

        let port = parsed.port().unwrap_or(443);
        let addrs = tokio::net::lookup_host(format!("{}:{}", host, port))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

        self.screen_resolved_ips(host, addrs.map(|addr| addr.ip()))?;

        Ok(validated)
    }

    /// Reject a host whose resolved addresses land in a blocked range.
    fn screen_resolved_ips(
        &self,
        host: &str,
        ips: impl IntoIterator<Item = IpAddr>,
    ) -> SecurityResult<()> {
        for ip in ips {
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(SecurityError::BlockedCidr(format!(
                        "DNS for {} resolved to blocked IP {}",
                        host, ip
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Attribute a URL to an ATS platform by host suffix, then by
/// platform-specific query marker.
pub fn detect_ats(url: &url::Url) -> Option<AtsType> {
    let host = url.host_str()?;

    for ats in AtsType::all() {
        for domain in ats.domains() {
            if host == *domain || host.ends_with(&format!(".{}", domain)) {
                return Some(*ats);
            }
        }
    }

    // Query markers identify embedded ATS forms on custom domains.
    let params: Vec<String> = url
        .query_pairs()
        .map(|(k, _)| k.to_lowercase())
        .collect();
    for ats in AtsType::all() {
        for marker in ats.query_markers() {
            if params.iter().any(|p| p == marker) {
                return Some(*ats);
            }
        }
    }

    None
}
