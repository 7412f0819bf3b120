use std::time::Duration;

use pinsync_core::cid::InvalidCid;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KuboError {
    #[error("invalid node API address {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("node answered HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("node returned no result for {0}")]
    EmptyResponse(&'static str),

    #[error(transparent)]
    Cid(#[from] InvalidCid),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SwarmConnectError {
    #[error("connection attempt to {addr} timed out after {timeout:?}")]
    TimedOut { addr: String, timeout: Duration },

    #[error("node could not connect to {addr}: {source}")]
    Failed {
        addr: String,
        #[source]
        source: KuboError,
    },
}
