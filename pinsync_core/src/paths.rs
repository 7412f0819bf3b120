//! Destination path safety.
//!
//! Manifest destinations are untrusted. Every destination goes through
//! [`normalize`] before anything touches the filesystem, dry runs included.

use std::path::{Component, Path, PathBuf};

use crate::error::PathSafetyError;

/// Rewrites `raw` into a relative path that stays under the working
/// directory.
///
/// The computation is lexical: `.` components are dropped and `name/..`
/// pairs cancel, so `a/../b` becomes `b` and `./a` becomes `a`. A path that
/// is empty or cancels out completely normalizes to `.`.
pub fn normalize(raw: impl AsRef<Path>) -> Result<PathBuf, PathSafetyError> {
    let raw = raw.as_ref();
    if raw.is_absolute() || raw.has_root() {
        return Err(PathSafetyError::Absolute(raw.to_path_buf()));
    }

    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in raw.components() {
        match component {
            // A drive prefix without a root still cannot be made relative.
            Component::Prefix(_) | Component::RootDir => {
                return Err(PathSafetyError::Absolute(raw.to_path_buf()));
            }
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(component),
            },
            Component::Normal(_) => parts.push(component),
        }
    }

    if matches!(parts.first(), Some(Component::ParentDir)) {
        return Err(PathSafetyError::OutsideRoot(raw.to_path_buf()));
    }
    if parts.is_empty() {
        return Ok(PathBuf::from("."));
    }
    Ok(parts.iter().collect())
}
