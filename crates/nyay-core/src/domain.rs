//! Trusted-domain whitelist shared by every web-facing component.

use url::Url;

/// Domains outside the `.gov.in` / `.nic.in` suffixes that may be read or cited.
pub const TRUSTED_DOMAINS: &[&str] = &[
    "indiacode.nic.in",
    "legislative.gov.in",
    "lawmin.gov.in",
    "india.gov.in",
    "doj.gov.in",
    "main.sci.gov.in",
    "niti.gov.in",
    "prsindia.org",
    "indiankanoon.org",
    "legalserviceindia.com",
    "en.wikipedia.org",
];

/// Government suffixes accepted for any host.
pub const TRUSTED_SUFFIXES: &[&str] = &[".gov.in", ".nic.in"];

#[derive(Debug, Clone)]
pub struct DomainWhitelist {
    domains: Vec<String>,
}

impl Default for DomainWhitelist {
    fn default() -> Self {
        Self {
            domains: TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl DomainWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_domains<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for domain in extra {
            let domain = normalize_host(&domain.into());
            if !domain.is_empty() && !self.domains.contains(&domain) {
                self.domains.push(domain);
            }
        }
        self
    }

    /// Whether a bare host (no scheme) is trusted.
    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        if TRUSTED_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
            return true;
        }
        self.domains
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
    }

    /// Whether an http(s) URL points at a trusted host.
    pub fn is_trusted_url(&self, url: &str) -> bool {
        domain_of(url).is_some_and(|host| self.is_trusted_host(&host))
    }
}

/// The host of an http(s) URL, lower-cased with any `www.` prefix removed.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(normalize_host).filter(|h| !h.is_empty())
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_government_suffixes_are_trusted() {
        let whitelist = DomainWhitelist::new();
        assert!(whitelist.is_trusted_url("https://www.mha.gov.in/en/acts"));
        assert!(whitelist.is_trusted_url("http://districts.ecourts.nic.in/"));
    }

    #[test]
    fn test_allow_list_and_subdomains() {
        let whitelist = DomainWhitelist::new();
        assert!(whitelist.is_trusted_url("https://indiankanoon.org/doc/1569253/"));
        assert!(whitelist.is_trusted_url("https://www.prsindia.org/billtrack"));
        assert!(!whitelist.is_trusted_url("https://fr.wikipedia.org/wiki/Inde"));
    }

    #[test]
    fn test_lookalike_hosts_are_rejected() {
        let whitelist = DomainWhitelist::new();
        assert!(!whitelist.is_trusted_url("https://indiankanoon.org.evil.example/doc"));
        assert!(!whitelist.is_trusted_url("https://notindiankanoon.org/"));
        assert!(!whitelist.is_trusted_url("http://untrusted.example"));
    }

    #[test]
    fn test_non_http_and_garbage_rejected() {
        let whitelist = DomainWhitelist::new();
        assert!(!whitelist.is_trusted_url("javascript:alert(1)"));
        assert!(!whitelist.is_trusted_url("ftp://indiacode.nic.in/file"));
        assert!(!whitelist.is_trusted_url("not a url"));
    }

    #[test]
    fn test_extra_domains() {
        let whitelist = DomainWhitelist::new().with_extra_domains(["WWW.LiveLaw.in"]);
        assert!(whitelist.is_trusted_url("https://www.livelaw.in/top-stories"));
    }

    #[test]
    fn test_domain_of_strips_www() {
        assert_eq!(domain_of("https://www.India.gov.in/x").as_deref(), Some("india.gov.in"));
        assert_eq!(domain_of("mailto:someone@doj.gov.in"), None);
    }
}
