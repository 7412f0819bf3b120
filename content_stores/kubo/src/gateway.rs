//! Peer-address discovery through a gateway's HTTP API.
//!
//! The gateway publishes the multiaddrs of its own IPFS node at
//! `<gateway>/<api>/ipfs/addr` as `{"addresses": [...]}`. Dialing one of them
//! from the local node makes subsequent fetches from the gateway fast.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_GATEWAY_URL: &str = "https://39alpharesearch.org/";
pub const DEFAULT_GATEWAY_API: &str = "api/v0";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid gateway address {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot fetch peer addresses from {url}: {source}")]
    Unreachable {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot fetch peer addresses from {url}: HTTP {status}")]
    Status { url: Url, status: u16 },

    #[error("could not parse peer addresses from {url}: {source}")]
    Parse {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewayAddrs {
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl GatewayAddrs {
    /// Prefers the first UDP (QUIC) address, falling back to the first
    /// address of any kind. `None` when the gateway listed nothing.
    pub fn choose(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|addr| addr.contains("/udp/"))
            .or_else(|| self.addresses.first())
            .map(String::as_str)
    }
}

/// `<gateway>/<api>/ipfs/addr`. A gateway without scheme is taken as https.
pub fn addresses_url(gateway: &str, api: &str) -> Result<Url, GatewayError> {
    let gateway = gateway.trim();
    let base = if gateway.contains("://") {
        gateway.to_owned()
    } else {
        format!("https://{gateway}")
    };
    let raw = format!(
        "{}/{}/ipfs/addr",
        base.trim_end_matches('/'),
        api.trim_matches('/')
    );
    Url::parse(&raw).map_err(|source| GatewayError::InvalidUrl { url: raw, source })
}

pub async fn fetch_addresses(client: &reqwest::Client, url: Url) -> Result<GatewayAddrs, GatewayError> {
    let unreachable = |source| GatewayError::Unreachable {
        url: url.clone(),
        source,
    };
    let response = client.get(url.clone()).send().await.map_err(unreachable)?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(GatewayError::Status {
            url,
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await.map_err(unreachable)?;
    serde_json::from_slice(&body).map_err(|source| GatewayError::Parse { url, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> GatewayAddrs {
        GatewayAddrs {
            addresses: list.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn prefers_udp_address() {
        let a = addrs(&[
            "/ip4/1.2.3.4/tcp/4001/p2p/QmPeer",
            "/ip4/1.2.3.4/udp/4001/quic-v1/p2p/QmPeer",
            "/ip6/::1/udp/4001/quic-v1/p2p/QmPeer",
        ]);
        assert_eq!(a.choose(), Some("/ip4/1.2.3.4/udp/4001/quic-v1/p2p/QmPeer"));
    }

    #[test]
    fn falls_back_to_first_address() {
        let a = addrs(&["/ip4/1.2.3.4/tcp/4001/p2p/QmPeer", "/dns4/x/tcp/4001"]);
        assert_eq!(a.choose(), Some("/ip4/1.2.3.4/tcp/4001/p2p/QmPeer"));
        assert_eq!(addrs(&[]).choose(), None);
    }

    #[test]
    fn parses_gateway_response() {
        let a: GatewayAddrs =
            serde_json::from_str(r#"{"addresses":["/ip4/1.2.3.4/udp/4001/quic"]}"#).unwrap();
        assert_eq!(a.addresses.len(), 1);
        let empty: GatewayAddrs = serde_json::from_str("{}").unwrap();
        assert!(empty.addresses.is_empty());
    }

    #[test]
    fn builds_address_endpoint() {
        assert_eq!(
            addresses_url(DEFAULT_GATEWAY_URL, DEFAULT_GATEWAY_API)
                .unwrap()
                .as_str(),
            "https://39alpharesearch.org/api/v0/ipfs/addr"
        );
        assert_eq!(
            addresses_url("gw.example:8443", "/api/v1/").unwrap().as_str(),
            "https://gw.example:8443/api/v1/ipfs/addr"
        );
        assert_eq!(
            addresses_url("http://127.0.0.1:8080", "api/v0").unwrap().as_str(),
            "http://127.0.0.1:8080/api/v0/ipfs/addr"
        );
    }
}
