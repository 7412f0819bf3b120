use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::BaseDirs;
use pinsync_remote::DEFAULT_PIN_COMMAND;
use pinsync_store_kubo::KuboConfig;
use pinsync_store_kubo::gateway::{DEFAULT_GATEWAY_API, DEFAULT_GATEWAY_URL};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REMOTE_DOMAIN: &str = "39alpharesearch.org";
pub const DEFAULT_REMOTE_PORT: u16 = 22;
pub const DEFAULT_REMOTE_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Contents of `config.toml`. Every key is optional; command line flags
/// override whatever is set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub node: NodeConfig,
    pub fetch: FetchConfig,
    pub remote: RemoteConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    pub api_url: String,
    pub connect_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let kubo = KuboConfig::default();
        Self {
            api_url: kubo.api_url,
            connect_timeout_ms: u64::try_from(kubo.connect_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub jobs: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Defaults to `$USER`.
    pub user: Option<String>,
    pub domain: String,
    pub port: u16,
    /// Defaults to `~/.ssh/id_rsa`.
    pub private_key: Option<PathBuf>,
    /// Defaults to `known_hosts` in the private key's directory.
    pub known_hosts: Option<PathBuf>,
    pub pin_command: String,
    pub connect_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: None,
            domain: DEFAULT_REMOTE_DOMAIN.to_owned(),
            port: DEFAULT_REMOTE_PORT,
            private_key: None,
            known_hosts: None,
            pin_command: DEFAULT_PIN_COMMAND.to_owned(),
            connect_timeout_ms: DEFAULT_REMOTE_CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    pub api: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_owned(),
            api: DEFAULT_GATEWAY_API.to_owned(),
        }
    }
}

impl SyncConfig {
    /// Reads `path`, falling back to the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let toml_content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read config file {path:?}"));
            }
        };
        toml::from_str(&toml_content).with_context(|| format!("invalid config file {path:?}"))
    }

    /// Node client settings, with `api_url` taking precedence over the file.
    pub fn kubo(&self, api_url: Option<String>) -> KuboConfig {
        KuboConfig {
            api_url: api_url.unwrap_or_else(|| self.node.api_url.clone()),
            connect_timeout: Duration::from_millis(self.node.connect_timeout_ms),
        }
    }
}

impl RemoteConfig {
    pub fn user_or_env(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
    }

    pub fn private_key_or_default(&self) -> Option<PathBuf> {
        self.private_key.clone().or_else(|| {
            BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("id_rsa"))
        })
    }

    pub fn known_hosts_for(&self, private_key: &Path) -> PathBuf {
        self.known_hosts.clone().unwrap_or_else(|| {
            private_key
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("known_hosts")
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.node.api_url, "127.0.0.1:5001");
        assert_eq!(config.node.connect_timeout_ms, 1000);
        assert_eq!(config.fetch.jobs, 1);
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.remote.pin_command, "ipfs pin add");
        assert_eq!(config.gateway.api, "api/v0");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[node]\napi_url = \"http://10.1.2.3:5001\"\n\n[remote]\nuser = \"deploy\"\nport = 2222\n",
        )
        .unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.node.api_url, "http://10.1.2.3:5001");
        assert_eq!(config.node.connect_timeout_ms, 1000);
        assert_eq!(config.remote.user.as_deref(), Some("deploy"));
        assert_eq!(config.remote.port, 2222);
        assert_eq!(config.remote.domain, DEFAULT_REMOTE_DOMAIN);
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[node\napi_url = 1").unwrap();
        assert!(SyncConfig::load(&path).is_err());

        std::fs::write(&path, "[remote]\nport = \"twenty-two\"\n").unwrap();
        assert!(SyncConfig::load(&path).is_err());
    }

    #[test]
    fn flag_overrides_node_address() {
        let config = SyncConfig::default();
        assert_eq!(config.kubo(None).api_url, "127.0.0.1:5001");
        assert_eq!(
            config.kubo(Some("node.lan:5001".into())).api_url,
            "node.lan:5001"
        );
        assert_eq!(config.kubo(None).connect_timeout, Duration::from_secs(1));
    }

    #[test]
    fn known_hosts_sits_next_to_the_key() {
        let remote = RemoteConfig::default();
        assert_eq!(
            remote.known_hosts_for(Path::new("/home/me/.ssh/id_ed25519")),
            Path::new("/home/me/.ssh/known_hosts")
        );

        let remote = RemoteConfig {
            known_hosts: Some("/etc/ssh/ssh_known_hosts".into()),
            ..Default::default()
        };
        assert_eq!(
            remote.known_hosts_for(Path::new("/home/me/.ssh/id_ed25519")),
            Path::new("/etc/ssh/ssh_known_hosts")
        );
    }

    #[test]
    fn explicit_private_key_wins() {
        let remote = RemoteConfig {
            private_key: Some("/keys/pin".into()),
            ..Default::default()
        };
        assert_eq!(remote.private_key_or_default(), Some(PathBuf::from("/keys/pin")));
    }
}
