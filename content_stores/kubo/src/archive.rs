use std::io::{self, Read};
use std::path::{Component, Path};

use tracing::warn;

/// Unpacks the tar stream produced by the node's `get` command into
/// `out_dir`.
///
/// Every entry is rooted at the requested CID. A file root lands at
/// `out_dir/<cid>`; the children of a directory root land directly in
/// `out_dir`, merging with whatever is already there.
pub(crate) fn unpack(reader: impl Read, out_dir: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let mut components = path.components();
        if !matches!(components.next(), Some(Component::Normal(_))) {
            warn!("skipping archive entry {path:?}: not rooted at the requested object");
            continue;
        }
        let rest = components.as_path();

        if rest.as_os_str().is_empty() {
            if !entry.header().entry_type().is_dir() {
                entry.unpack_in(out_dir)?;
            }
            continue;
        }
        if !rest.components().all(|c| matches!(c, Component::Normal(_))) {
            warn!("skipping archive entry {path:?}: escapes the output directory");
            continue;
        }

        let dst = out_dir.join(rest);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&dst)?;
    }
    Ok(())
}
