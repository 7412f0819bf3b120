use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use ssh_key::known_hosts::{HostPatterns, KnownHosts, Marker};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum HostVerificationError {
    #[error("cannot read known hosts file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no trusted host key for {host}")]
    NoTrustedKeys { host: String },

    #[error("{host} did not present a host key")]
    NoHostKey { host: String },

    #[error("{host} presented a revoked host key")]
    Revoked { host: String },

    #[error("{host} presented a host key that matches none of its trusted keys")]
    Mismatch { host: String },
}

/// Host keys trusted for one `host:port`, taken from a known-hosts file.
///
/// Keys are stored as their SSH wire encoding, so verification is a plain set
/// membership test against the blob the server presents.
#[derive(Debug, Clone, Default)]
pub struct TrustedHostKeys {
    host: String,
    port: u16,
    trusted: HashSet<Vec<u8>>,
    revoked: HashSet<Vec<u8>>,
}

impl TrustedHostKeys {
    pub fn load(path: &Path, host: &str, port: u16) -> Result<Self, HostVerificationError> {
        let input = std::fs::read_to_string(path).map_err(|source| {
            HostVerificationError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let keys = Self::parse(&input, host, port);
        debug!(
            "{} trusted host keys for {host}:{port} in {}",
            keys.len(),
            path.display()
        );
        Ok(keys)
    }

    /// Collects the keys of every record whose host patterns name `host`.
    ///
    /// Records are read in order until the first one that fails to parse;
    /// everything after it is ignored.
    pub fn parse(input: &str, host: &str, port: u16) -> Self {
        let mut keys = Self {
            host: host.to_owned(),
            port,
            ..Default::default()
        };

        for entry in KnownHosts::new(input) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("ignoring the rest of the known hosts file after a malformed record: {e}");
                    break;
                }
            };
            if !patterns_match(entry.host_patterns(), host, port) {
                continue;
            }
            let blob = match entry.public_key().to_bytes() {
                Ok(blob) => blob,
                Err(e) => {
                    warn!("skipping unencodable host key for {host}: {e}");
                    continue;
                }
            };
            match entry.marker() {
                None => {
                    keys.trusted.insert(blob);
                }
                Some(Marker::Revoked) => {
                    keys.revoked.insert(blob);
                }
                Some(Marker::CertAuthority) => {
                    debug!("skipping certificate authority record for {host}");
                }
            }
        }
        keys
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn len(&self) -> usize {
        self.trusted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty()
    }

    /// Accepts `presented` only if it is exactly one of the trusted keys and
    /// has not been revoked.
    pub fn verify(&self, presented: &[u8]) -> Result<(), HostVerificationError> {
        let host = || self.host.clone();
        if self.revoked.contains(presented) {
            return Err(HostVerificationError::Revoked { host: host() });
        }
        if self.trusted.is_empty() {
            return Err(HostVerificationError::NoTrustedKeys { host: host() });
        }
        if self.trusted.contains(presented) {
            Ok(())
        } else {
            Err(HostVerificationError::Mismatch { host: host() })
        }
    }
}

/// Exact, case-insensitive host matching. `[host]:port` patterns only match
/// the same port; a negated pattern that matches excludes the record.
/// Hashed host names are never matched.
fn patterns_match(patterns: &HostPatterns, host: &str, port: u16) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        return false;
    };
    let mut matched = false;
    for pattern in patterns {
        let (negated, pattern) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern.as_str()),
        };
        if pattern_matches(pattern, host, port) {
            if negated {
                return false;
            }
            matched = true;
        }
    }
    matched
}

fn pattern_matches(pattern: &str, host: &str, port: u16) -> bool {
    if let Some(rest) = pattern.strip_prefix('[') {
        let Some((name, pattern_port)) = rest.split_once("]:") else {
            return false;
        };
        return name.eq_ignore_ascii_case(host) && pattern_port.parse::<u16>().ok() == Some(port);
    }
    pattern.eq_ignore_ascii_case(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssh_key::PublicKey;

    const KNOWN_HOSTS: &str = include_str!("../tests/fixtures/known_hosts");

    fn blob_of(line_prefix: &str) -> Vec<u8> {
        let line = KNOWN_HOSTS
            .lines()
            .find(|l| l.starts_with(line_prefix))
            .unwrap();
        let fields: Vec<&str> = line.split_whitespace().collect();
        let key = fields[fields.len() - 2..].join(" ");
        PublicKey::from_openssh(&key).unwrap().to_bytes().unwrap()
    }

    #[test]
    fn collects_only_keys_of_target_host() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "pin.example.org", 22);
        assert_eq!(keys.len(), 2);
        keys.verify(&blob_of("pin.example.org,10.0.0.7 ")).unwrap();
        keys.verify(&blob_of("pin.example.org ssh-ed25519")).unwrap();
    }

    #[test]
    fn matches_any_name_in_a_pattern_list() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "10.0.0.7", 22);
        assert_eq!(keys.len(), 1);
        keys.verify(&blob_of("pin.example.org,10.0.0.7 ")).unwrap();
    }

    #[test]
    fn host_names_compare_case_insensitively() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "PIN.Example.ORG", 22);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn unknown_key_is_a_mismatch() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "other.example.org", 22);
        let err = keys
            .verify(&blob_of("pin.example.org ssh-ed25519"))
            .unwrap_err();
        assert!(matches!(err, HostVerificationError::Mismatch { .. }));
    }

    #[test]
    fn revoked_key_is_rejected_even_when_trusted() {
        // `[pin.example.org]:2222` trusts the key that `@revoked` revokes.
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "pin.example.org", 2222);
        assert_eq!(keys.len(), 3);
        let err = keys.verify(&blob_of("@revoked")).unwrap_err();
        assert!(matches!(err, HostVerificationError::Revoked { .. }));
    }

    #[test]
    fn bracketed_patterns_need_matching_port() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "pin.example.org", 22);
        assert!(!keys.trusted.contains(&blob_of("[pin.example.org]:2222")));
    }

    #[test]
    fn no_entries_means_no_trust() {
        let keys = TrustedHostKeys::parse(KNOWN_HOSTS, "unknown.example.org", 22);
        assert!(keys.is_empty());
        let err = keys.verify(&blob_of("other.example.org")).unwrap_err();
        assert!(matches!(err, HostVerificationError::NoTrustedKeys { .. }));
    }

    #[test]
    fn parsing_stops_at_first_malformed_record() {
        let ed25519 = KNOWN_HOSTS
            .lines()
            .find(|l| l.starts_with("pin.example.org ssh-ed25519"))
            .unwrap();
        let ecdsa = KNOWN_HOSTS
            .lines()
            .find(|l| l.starts_with("pin.example.org,10.0.0.7 "))
            .unwrap();
        let input = format!("{ed25519}\npin.example.org not-a-key-type AAAA\n{ecdsa}\n");
        let keys = TrustedHostKeys::parse(&input, "pin.example.org", 22);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn negated_pattern_excludes_record() {
        let key = KNOWN_HOSTS
            .lines()
            .find(|l| l.starts_with("other.example.org"))
            .unwrap()
            .split_once(' ')
            .unwrap()
            .1;
        let input = format!("*.example.org,!pin.example.org {key}\npin.example.org {key}\n");
        let keys = TrustedHostKeys::parse(&input, "pin.example.org", 22);
        assert_eq!(keys.len(), 1);
        let input = format!("pin.example.org,!pin.example.org {key}\n");
        let keys = TrustedHostKeys::parse(&input, "pin.example.org", 22);
        assert!(keys.is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TrustedHostKeys::load(Path::new("/nonexistent/known_hosts"), "h", 22).unwrap_err();
        assert!(matches!(err, HostVerificationError::Unreadable { .. }));
    }
}
