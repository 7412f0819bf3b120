//! Wire types and pure helpers for the Kubo RPC API.

use pinsync_core::{Cid, Link};
use serde::Deserialize;
use url::Url;

use crate::error::KuboError;

const API_PATH: &str = "api/v0";

/// Builds the base URL every RPC command is joined onto, always ending in
/// `/api/v0/`.
pub(crate) fn api_base_url(raw: &str) -> Result<Url, KuboError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|source| KuboError::InvalidApiUrl {
        url: raw.to_owned(),
        source,
    })?;

    let path = url.path().trim_end_matches('/').to_owned();
    if path.ends_with(API_PATH) {
        url.set_path(&format!("{path}/"));
    } else {
        url.set_path(&format!("{path}/{API_PATH}/"));
    }
    Ok(url)
}

/// Error body the node sends along with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

pub(crate) fn api_error(status: u16, body: &str) -> KuboError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_owned());
    KuboError::Api { status, message }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionResponse {
    #[serde(rename = "Version")]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Option<Vec<LsLink>>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

/// Links of the single object an `ls` call was made for.
pub(crate) fn parse_ls(body: &[u8]) -> Result<Vec<Link>, KuboError> {
    let response: LsResponse = serde_json::from_slice(body)?;
    let object = response
        .objects
        .into_iter()
        .next()
        .ok_or(KuboError::EmptyResponse("ls"))?;
    object
        .links
        .unwrap_or_default()
        .into_iter()
        .map(|link| {
            Ok(Link {
                name: link.name,
                cid: Cid::new(link.hash)?,
                size: link.size,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddEntry {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
}

/// `add` streams one JSON object per added file or directory.
pub(crate) fn parse_add(body: &str) -> Result<Vec<AddEntry>, KuboError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(KuboError::from))
        .collect()
}

/// Picks the CID of the root that was added: the entry named `root_name`,
/// or the last one the node reported.
pub(crate) fn added_root(entries: &[AddEntry], root_name: &str) -> Result<Cid, KuboError> {
    let entry = entries
        .iter()
        .find(|e| e.name == root_name)
        .or_else(|| entries.last())
        .ok_or(KuboError::EmptyResponse("add"))?;
    Ok(Cid::new(entry.hash.clone())?)
}

/// Multipart file names are query-escaped, the way the node decodes them.
pub(crate) fn encode_file_name(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes()).collect()
}
