use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cid::Cid;
use crate::error::TransferError;
use crate::store::ContentStore;

/// Shape of an object as seen by the fetch protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Directory,
}

/// Implements fetch, put and pin on top of a [`ContentStore`].
///
/// Destinations handed to [`AssetResolver::fetch`] must already have been
/// through `paths::normalize`; they are resolved against the resolver's
/// root, which defaults to the current working directory.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    store: Arc<dyn ContentStore>,
    root: PathBuf,
}

impl AssetResolver {
    pub fn new<S>(store: S) -> Self
    where
        S: ContentStore,
    {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            root: PathBuf::from("."),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// An object is a directory if it has at least one named link.
    ///
    /// Files split into chunks have only nameless links, so a directory whose
    /// single child has no name is classified as a file as well.
    pub async fn classify(&self, cid: &Cid) -> Result<ObjectKind, TransferError> {
        let links = self
            .store
            .list(cid)
            .await
            .map_err(|source| TransferError::Store {
                op: "list",
                object: cid.to_string(),
                source,
            })?;
        if links.iter().any(|link| !link.name.is_empty()) {
            Ok(ObjectKind::Directory)
        } else {
            Ok(ObjectKind::File)
        }
    }

    /// Retrieves `cid` to `dest`.
    ///
    /// Directories are retrieved into `dest`, which is created if needed.
    /// Files are downloaded next to `dest` under the CID's name and then
    /// renamed onto `dest`.
    pub async fn fetch(&self, cid: &Cid, dest: &Path) -> Result<ObjectKind, TransferError> {
        let target = self.root.join(dest);
        let kind = self.classify(cid).await?;
        match kind {
            ObjectKind::Directory => self.fetch_dir(cid, &target).await?,
            ObjectKind::File => self.fetch_file(cid, &target).await?,
        }
        Ok(kind)
    }

    async fn fetch_dir(&self, cid: &Cid, target: &Path) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| TransferError::io(target, e))?;
        debug!("retrieving directory {cid} into {target:?}");
        self.get(cid, target).await
    }

    async fn fetch_file(&self, cid: &Cid, target: &Path) -> Result<(), TransferError> {
        let out_dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| TransferError::io(&out_dir, e))?;

        debug!("retrieving file {cid} into {out_dir:?}");
        self.get(cid, &out_dir).await?;

        let artifact = out_dir.join(cid.as_str());
        match tokio::fs::try_exists(&artifact).await {
            Ok(true) => {}
            Ok(false) => return Err(TransferError::DownloadIncomplete(artifact)),
            Err(e) => return Err(TransferError::io(&artifact, e)),
        }
        if artifact == target {
            return Ok(());
        }

        if let Err(rename) = tokio::fs::rename(&artifact, target).await {
            warn!("could not move {artifact:?} to {target:?}, removing it: {rename}");
            return match tokio::fs::remove_file(&artifact).await {
                Ok(()) => Err(TransferError::Rename {
                    from: artifact,
                    to: target.to_path_buf(),
                    source: rename,
                }),
                Err(cleanup) => Err(TransferError::Cleanup {
                    from: artifact,
                    to: target.to_path_buf(),
                    rename,
                    source: cleanup,
                }),
            };
        }
        Ok(())
    }

    async fn get(&self, cid: &Cid, out_dir: &Path) -> Result<(), TransferError> {
        self.store
            .get(cid, out_dir)
            .await
            .map_err(|source| TransferError::Store {
                op: "get",
                object: cid.to_string(),
                source,
            })
    }

    /// Adds a local file or directory tree and returns the resulting CID.
    pub async fn put(&self, path: &Path) -> Result<Cid, TransferError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        let added = if meta.is_dir() {
            self.store.add_dir(path).await
        } else if meta.is_file() {
            self.store.add_file(path).await
        } else {
            return Err(TransferError::UnsupportedPathType(path.to_path_buf()));
        };
        added.map_err(|source| TransferError::Store {
            op: "add",
            object: path.display().to_string(),
            source,
        })
    }

    pub async fn pin(&self, cid: &Cid) -> Result<(), TransferError> {
        self.store
            .pin(cid)
            .await
            .map_err(|source| TransferError::Store {
                op: "pin",
                object: cid.to_string(),
                source,
            })
    }
}
