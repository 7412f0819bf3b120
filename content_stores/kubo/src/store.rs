use std::io::{Seek, SeekFrom};
use std::path::{Component, Path};
use std::time::Duration;

use anyhow::{Context, anyhow};
use futures::StreamExt;
use pinsync_core::store::{ContentStore, Link, StoreResult};
use pinsync_core::{Cid, ConnectivityError};
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;
use walkdir::WalkDir;

use crate::archive;
use crate::config::KuboConfig;
use crate::error::{KuboError, SwarmConnectError};
use crate::rpc::{self, VersionResponse};

const DIRECTORY_MIME: &str = "application/x-directory";

/// Client for a single IPFS node's RPC API.
#[derive(Debug, Clone)]
pub struct KuboStore {
    client: reqwest::Client,
    api_base: Url,
}

impl KuboStore {
    /// Builds a client without contacting the node.
    pub fn new(config: &KuboConfig) -> Result<Self, KuboError> {
        let api_base = rpc::api_base_url(&config.api_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, api_base })
    }

    /// Builds a client and checks that the node answers.
    pub async fn connect(config: &KuboConfig) -> Result<Self, ConnectivityError> {
        let store = Self::new(config).map_err(|e| ConnectivityError {
            endpoint: config.api_url.clone(),
            source: e.into(),
        })?;
        match store.version().await {
            Ok(version) => {
                debug!("connected to IPFS node {} (version {version})", store.api_base);
                Ok(store)
            }
            Err(e) => Err(ConnectivityError {
                endpoint: store.api_base.to_string(),
                source: e.into(),
            }),
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub async fn is_up(&self) -> bool {
        self.version().await.is_ok()
    }

    pub async fn version(&self) -> Result<String, KuboError> {
        let response = self.call("version", &[]).await?;
        Ok(response.json::<VersionResponse>().await?.version)
    }

    /// Asks the node to open a connection to the peer at multiaddr `addr`,
    /// giving up after `timeout`.
    pub async fn swarm_connect(&self, addr: &str, timeout: Duration) -> Result<(), SwarmConnectError> {
        let failed = |source: KuboError| SwarmConnectError::Failed {
            addr: addr.to_owned(),
            source,
        };
        let url = self.command_url("swarm/connect", &[("arg", addr)]).map_err(failed)?;
        let response = match self.client.post(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(SwarmConnectError::TimedOut {
                    addr: addr.to_owned(),
                    timeout,
                });
            }
            Err(e) => return Err(failed(e.into())),
        };
        check_status(response).await.map_err(failed)?;
        Ok(())
    }

    fn command_url(&self, command: &str, args: &[(&str, &str)]) -> Result<Url, KuboError> {
        let mut url = self
            .api_base
            .join(command)
            .map_err(|source| KuboError::InvalidApiUrl {
                url: format!("{}{command}", self.api_base),
                source,
            })?;
        if !args.is_empty() {
            url.query_pairs_mut().extend_pairs(args);
        }
        Ok(url)
    }

    /// Every RPC command is a POST; arguments travel in the query string.
    async fn call(&self, command: &str, args: &[(&str, &str)]) -> Result<reqwest::Response, KuboError> {
        let url = self.command_url(command, args)?;
        let response = self.client.post(url).send().await?;
        check_status(response).await
    }

    async fn add_form(&self, form: Form, root_name: &str) -> StoreResult<Cid> {
        let url = self.command_url("add", &[])?;
        let response = self.client.post(url).multipart(form).send().await?;
        let body = check_status(response).await?.text().await?;
        let entries = rpc::parse_add(&body)?;
        Ok(rpc::added_root(&entries, root_name)?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, KuboError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(rpc::api_error(status.as_u16(), &body))
}

async fn file_part(path: &Path, name: &str) -> StoreResult<Part> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let len = file.metadata().await?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, len).file_name(rpc::encode_file_name(name)))
}

fn slash_path(rel: &Path) -> StoreResult<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| anyhow!("non UTF-8 path component in {}", rel.display()))?,
            ),
            other => return Err(anyhow!("unexpected path component {other:?}")),
        }
    }
    Ok(parts.join("/"))
}

async fn root_name(path: &Path) -> StoreResult<(std::path::PathBuf, String)> {
    let absolute = tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    let name = absolute
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root")
        .to_owned();
    Ok((absolute, name))
}

#[async_trait::async_trait]
impl ContentStore for KuboStore {
    async fn list(&self, cid: &Cid) -> StoreResult<Vec<Link>> {
        let body = self.call("ls", &[("arg", cid.as_str())]).await?.bytes().await?;
        Ok(rpc::parse_ls(&body)?)
    }

    async fn get(&self, cid: &Cid, out_dir: &Path) -> StoreResult<()> {
        let response = self.call("get", &[("arg", cid.as_str())]).await?;

        // Spool the archive next to its destination, then unpack off the
        // async runtime.
        let spool = tempfile::tempfile_in(out_dir)
            .with_context(|| format!("failed to create spool file in {}", out_dir.display()))?;
        let mut file = tokio::fs::File::from_std(spool);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        let mut spool = file.into_std().await;

        let out_dir = out_dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            spool.seek(SeekFrom::Start(0))?;
            archive::unpack(spool, &out_dir)
                .with_context(|| format!("failed to unpack archive into {}", out_dir.display()))
        })
        .await??;
        Ok(())
    }

    async fn add_file(&self, path: &Path) -> StoreResult<Cid> {
        let (absolute, name) = root_name(path).await?;
        let form = Form::new().part("file", file_part(&absolute, &name).await?);
        self.add_form(form, &name).await
    }

    async fn add_dir(&self, path: &Path) -> StoreResult<Cid> {
        let (absolute, name) = root_name(path).await?;
        let mut form = Form::new();
        for entry in WalkDir::new(&absolute).sort_by_file_name() {
            let entry = entry?;
            let rel = slash_path(entry.path().strip_prefix(&absolute)?)?;
            let part_name = if rel.is_empty() {
                name.clone()
            } else {
                format!("{name}/{rel}")
            };

            let part = if entry.file_type().is_dir() {
                Part::bytes(Vec::new())
                    .file_name(rpc::encode_file_name(&part_name))
                    .mime_str(DIRECTORY_MIME)?
            } else if entry.file_type().is_file() {
                file_part(entry.path(), &part_name).await?
            } else {
                warn!("skipping {}: not a regular file or directory", entry.path().display());
                continue;
            };
            form = form.part("file", part);
        }
        self.add_form(form, &name).await
    }

    async fn pin(&self, cid: &Cid) -> StoreResult<()> {
        self.call("pin/add", &[("arg", cid.as_str())]).await?;
        Ok(())
    }
}
