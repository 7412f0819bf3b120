use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cid::Cid;

pub type StoreResult<T, E = anyhow::Error> = std::result::Result<T, E>;

/// A child reference of an object in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Empty for the raw chunks of a file, set for directory entries.
    pub name: String,
    pub cid: Cid,
    pub size: u64,
}

/// Capability surface the engine needs from a content-addressed store.
///
/// Implementations only move data; deciding what to fetch where, and
/// keeping writes inside the sync root, is the job of `AssetResolver`.
#[async_trait]
pub trait ContentStore: std::fmt::Debug + Send + Sync + 'static {
    /// Lists the links directly below `cid`.
    async fn list(&self, cid: &Cid) -> StoreResult<Vec<Link>>;

    /// Retrieves `cid` into `out_dir`. A file is written to `out_dir/<cid>`;
    /// the children of a directory are written directly into `out_dir`,
    /// replacing files and reusing directories that already exist there.
    async fn get(&self, cid: &Cid, out_dir: &Path) -> StoreResult<()>;

    /// Adds the bytes of a regular file and returns their CID.
    async fn add_file(&self, path: &Path) -> StoreResult<Cid>;

    /// Adds a directory tree and returns the CID of its root.
    async fn add_dir(&self, path: &Path) -> StoreResult<Cid>;

    /// Pins `cid` so the node retains it against garbage collection.
    async fn pin(&self, cid: &Cid) -> StoreResult<()>;
}
