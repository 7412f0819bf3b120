use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use pinsync_core::store::{ContentStore, Link, StoreResult};
use pinsync_core::Cid;

#[derive(Debug, Clone)]
enum Node {
    File(Bytes),
    /// A file split into nameless chunk links.
    Chunked(Vec<Cid>),
    Dir(Vec<(String, Cid)>),
}

/// Operations that can be made to fail for a given CID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    List,
    Get,
    /// `get` reports success but writes nothing.
    GetWithoutOutput,
    Pin,
}

/// Content store that keeps every object in memory.
///
/// `get` materializes objects on the local filesystem exactly like a real
/// node would, so the fetch protocol can be exercised end to end.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: DashMap<Cid, Node>,
    pins: DashSet<Cid>,
    faults: DashSet<(Cid, Fault)>,
    get_calls: AtomicUsize,
    pin_calls: AtomicUsize,
}

fn digest_cid(hash: blake3::Hash) -> StoreResult<Cid> {
    Ok(Cid::new(format!("b3{}", hash.to_hex()))?)
}

impl MemoryContentStore {
    /// Creates a new, empty `MemoryContentStore`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bytes(&self, bytes: impl Into<Bytes>) -> StoreResult<Cid> {
        let bytes = bytes.into();
        let cid = digest_cid(blake3::hash(&bytes))?;
        self.objects.insert(cid.clone(), Node::File(bytes));
        Ok(cid)
    }

    /// Stores a file as a list of nameless chunks, like large files on a
    /// real node.
    pub fn insert_chunked(&self, chunks: Vec<Bytes>) -> StoreResult<Cid> {
        let mut hasher = blake3::Hasher::new();
        let mut links = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let link = self.insert_bytes(chunk)?;
            hasher.update(link.as_str().as_bytes());
            links.push(link);
        }
        let cid = digest_cid(hasher.finalize())?;
        self.objects.insert(cid.clone(), Node::Chunked(links));
        Ok(cid)
    }

    pub fn insert_dir(&self, entries: Vec<(String, Cid)>) -> StoreResult<Cid> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"dir");
        for (name, cid) in &entries {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(cid.as_str().as_bytes());
        }
        let cid = digest_cid(hasher.finalize())?;
        self.objects.insert(cid.clone(), Node::Dir(entries));
        Ok(cid)
    }

    /// Stores file content under a caller-chosen CID.
    pub fn insert_file_as(&self, cid: Cid, bytes: impl Into<Bytes>) {
        self.objects.insert(cid, Node::File(bytes.into()));
    }

    /// Stores a directory under a caller-chosen CID.
    pub fn insert_dir_as(&self, cid: Cid, entries: Vec<(String, Cid)>) {
        self.objects.insert(cid, Node::Dir(entries));
    }

    pub fn inject(&self, cid: &Cid, fault: Fault) {
        self.faults.insert((cid.clone(), fault));
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.pins.contains(cid)
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn pin_calls(&self) -> usize {
        self.pin_calls.load(Ordering::SeqCst)
    }

    fn check(&self, cid: &Cid, fault: Fault) -> StoreResult<()> {
        if self.faults.contains(&(cid.clone(), fault)) {
            bail!("injected {fault:?} failure for {cid}");
        }
        Ok(())
    }

    fn node(&self, cid: &Cid) -> StoreResult<Node> {
        self.objects
            .get(cid)
            .map(|node| node.value().clone())
            .ok_or_else(|| anyhow!("object {cid} not found"))
    }

    fn file_bytes(&self, cid: &Cid) -> StoreResult<Bytes> {
        match self.node(cid)? {
            Node::File(bytes) => Ok(bytes),
            Node::Chunked(links) => {
                let mut out = Vec::new();
                for link in &links {
                    out.extend_from_slice(&self.file_bytes(link)?);
                }
                Ok(Bytes::from(out))
            }
            Node::Dir(_) => bail!("object {cid} is a directory"),
        }
    }

    /// Resolves `cid` into the directories and files that `get` writes.
    fn plan(
        &self,
        cid: &Cid,
        path: PathBuf,
        dirs: &mut Vec<PathBuf>,
        files: &mut Vec<(PathBuf, Bytes)>,
    ) -> StoreResult<()> {
        match self.node(cid)? {
            Node::Dir(entries) => {
                for (name, child) in &entries {
                    self.plan(child, path.join(name), dirs, files)?;
                }
                dirs.push(path);
            }
            Node::File(_) | Node::Chunked(_) => files.push((path, self.file_bytes(cid)?)),
        }
        Ok(())
    }

    fn add_tree(&self, path: &Path) -> StoreResult<Cid> {
        let meta = std::fs::metadata(path)?;
        if meta.is_file() {
            return self.insert_bytes(std::fs::read(path)?);
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|name| anyhow!("non UTF-8 file name {name:?}"))?;
            entries.push((name, self.add_tree(&entry.path())?));
        }
        entries.sort();
        self.insert_dir(entries)
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn list(&self, cid: &Cid) -> StoreResult<Vec<Link>> {
        self.check(cid, Fault::List)?;
        let links = match self.node(cid)? {
            Node::File(_) => Vec::new(),
            Node::Chunked(chunks) => chunks
                .into_iter()
                .map(|cid| {
                    let size = self.file_bytes(&cid).map(|b| b.len() as u64).unwrap_or(0);
                    Link {
                        name: String::new(),
                        cid,
                        size,
                    }
                })
                .collect(),
            Node::Dir(entries) => entries
                .into_iter()
                .map(|(name, cid)| Link { name, cid, size: 0 })
                .collect(),
        };
        Ok(links)
    }

    async fn get(&self, cid: &Cid, out_dir: &Path) -> StoreResult<()> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check(cid, Fault::Get)?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let root = match self.node(cid)? {
            Node::Dir(_) => out_dir.to_path_buf(),
            Node::File(_) | Node::Chunked(_) => out_dir.join(cid.as_str()),
        };
        self.plan(cid, root, &mut dirs, &mut files)?;
        if self.faults.contains(&(cid.clone(), Fault::GetWithoutOutput)) {
            return Ok(());
        }

        for dir in dirs {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        for (path, bytes) in files {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }

    async fn add_file(&self, path: &Path) -> StoreResult<Cid> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.insert_bytes(bytes)
    }

    async fn add_dir(&self, path: &Path) -> StoreResult<Cid> {
        self.add_tree(path)
    }

    async fn pin(&self, cid: &Cid) -> StoreResult<()> {
        self.pin_calls.fetch_add(1, Ordering::SeqCst);
        self.check(cid, Fault::Pin)?;
        if !self.objects.contains_key(cid) {
            bail!("cannot pin unknown object {cid}");
        }
        self.pins.insert(cid.clone());
        Ok(())
    }
}
