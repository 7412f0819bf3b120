use std::time::Duration;

pub const DEFAULT_API_URL: &str = "127.0.0.1:5001";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KuboConfig {
    /// Address of the node's RPC API. The scheme is optional and defaults to
    /// `http`; a trailing `/api/v0` is accepted.
    pub api_url: String,
    pub connect_timeout: Duration,
}

impl Default for KuboConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
