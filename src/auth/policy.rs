//! Network and path gates. Both run before any storage or crypto work.

use crate::{config::Settings, Error, Result};
use regex::Regex;
use std::net::IpAddr;

/// Outcome of the network gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkVerdict {
    Allowed,
    Blacklisted,
    NotWhitelisted,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkPolicy {
    whitelist: Vec<IpAddr>,
    blacklist: Vec<IpAddr>,
}

fn parse_ips(option: &str, values: &[String]) -> Result<Vec<IpAddr>> {
    values
        .iter()
        .map(|value| {
            value
                .trim()
                .parse::<IpAddr>()
                .map(|ip| ip.to_canonical())
                .map_err(|_| {
                    Error::InvalidConfig(format!("{option} contains an invalid IP: {value}"))
                })
        })
        .collect()
}

impl NetworkPolicy {
    /// # Errors
    /// Returns `Error::InvalidConfig` for unparsable addresses.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            whitelist: parse_ips("whitelist_ips", &settings.whitelist_ips)?,
            blacklist: parse_ips("blacklist_ips", &settings.blacklist_ips)?,
        })
    }

    /// Blacklist first; a non-empty whitelist then admits only listed addresses.
    /// An unknown client address never matches a list.
    #[must_use]
    pub fn check(&self, client_ip: Option<IpAddr>) -> NetworkVerdict {
        let ip = client_ip.map(|ip| ip.to_canonical());
        if ip.is_some_and(|ip| self.blacklist.contains(&ip)) {
            return NetworkVerdict::Blacklisted;
        }
        if !self.whitelist.is_empty() && !ip.is_some_and(|ip| self.whitelist.contains(&ip)) {
            return NetworkVerdict::NotWhitelisted;
        }
        NetworkVerdict::Allowed
    }
}

/// Glob allow-list: `*` matches any run of characters, the whole path must match.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    patterns: Vec<Regex>,
}

/// `/api/*` becomes `^/api/.*$`; everything but `*` is literal.
///
/// # Errors
/// Returns `Error::InvalidConfig` if the pattern does not compile.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let body = glob
        .trim()
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| Error::InvalidConfig(format!("invalid path pattern {glob}: {e}")))
}

impl PathPolicy {
    /// # Errors
    /// Returns `Error::InvalidConfig` if any pattern does not compile.
    pub fn new(globs: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: globs
                .iter()
                .map(|glob| glob_to_regex(glob))
                .collect::<Result<_>>()?,
        })
    }

    /// An empty pattern list allows every path.
    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(value: &str) -> Option<IpAddr> {
        value.parse().ok()
    }

    fn network(white: &[&str], black: &[&str]) -> NetworkPolicy {
        let settings = Settings {
            whitelist_ips: white.iter().map(ToString::to_string).collect(),
            blacklist_ips: black.iter().map(ToString::to_string).collect(),
            ..Settings::default()
        };
        NetworkPolicy::from_settings(&settings).unwrap_or_default()
    }

    #[test]
    fn blacklist_wins() {
        let policy = network(&["1.2.3.4"], &["1.2.3.4"]);
        assert_eq!(policy.check(ip("1.2.3.4")), NetworkVerdict::Blacklisted);
    }

    #[test]
    fn whitelist_restricts_when_set() {
        let policy = network(&["9.9.9.9"], &[]);
        assert_eq!(policy.check(ip("9.9.9.9")), NetworkVerdict::Allowed);
        assert_eq!(policy.check(ip("8.8.8.8")), NetworkVerdict::NotWhitelisted);
        assert_eq!(policy.check(None), NetworkVerdict::NotWhitelisted);
    }

    #[test]
    fn empty_lists_allow_everyone() {
        let policy = network(&[], &[]);
        assert_eq!(policy.check(ip("8.8.8.8")), NetworkVerdict::Allowed);
        assert_eq!(policy.check(None), NetworkVerdict::Allowed);
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_entry() {
        let policy = network(&[], &["1.2.3.4"]);
        assert_eq!(policy.check(ip("::ffff:1.2.3.4")), NetworkVerdict::Blacklisted);
    }

    #[test]
    fn invalid_ip_rejected() {
        let settings = Settings {
            whitelist_ips: vec!["300.1.1.1".to_string()],
            ..Settings::default()
        };
        assert!(matches!(
            NetworkPolicy::from_settings(&settings),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn glob_is_anchored() {
        let policy = PathPolicy::new(&["/api/*".to_string()]).unwrap();
        assert!(policy.allows("/api/widgets"));
        assert!(policy.allows("/api/"));
        assert!(!policy.allows("/other"));
        assert!(!policy.allows("/v2/api/widgets"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn glob_escapes_regex_characters() {
        let policy = PathPolicy::new(&["/files/*.json".to_string()]).unwrap();
        assert!(policy.allows("/files/a.json"));
        assert!(!policy.allows("/files/a_json"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn empty_pattern_list_allows_all() {
        assert!(PathPolicy::new(&[]).unwrap().allows("/anything"));
    }
}
