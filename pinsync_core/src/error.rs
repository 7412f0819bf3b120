use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exit::FailureKind;

/// A manifest destination that must not be written to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSafetyError {
    #[error("path {0:?} is absolute and cannot be made relative")]
    Absolute(PathBuf),
    #[error("path {0:?} resolves above the working directory")]
    OutsideRoot(PathBuf),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("content store failed to {op} {object}: {source:#}")]
    Store {
        op: &'static str,
        object: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no blocks downloaded to {0:?}")]
    DownloadIncomplete(PathBuf),

    /// The download succeeded but could not be moved into place; the
    /// temporary artifact was removed again.
    #[error("could not move {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The download could not be moved into place and the temporary artifact
    /// is still on disk.
    #[error(
        "could not move {from:?} to {to:?} ({rename}); cleanup of the orphaned artifact failed: {source}"
    )]
    Cleanup {
        from: PathBuf,
        to: PathBuf,
        rename: io::Error,
        #[source]
        source: io::Error,
    },

    #[error("{0:?} is neither a directory nor a regular file")]
    UnsupportedPathType(PathBuf),

    #[error("filesystem error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest from {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse manifest from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write manifest to {target}: {source}")]
    Write {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// The content store or remote node could not be reached.
#[derive(Debug, Error)]
#[error("cannot reach {endpoint}: {source:#}")]
pub struct ConnectivityError {
    pub endpoint: String,
    #[source]
    pub source: anyhow::Error,
}

/// Failure of a single manifest entry. Never aborts the batch.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error(transparent)]
    PathSafety(#[from] PathSafetyError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl EntryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EntryError::PathSafety(_) => FailureKind::PathSafety,
            EntryError::Transfer(_) => FailureKind::Transfer,
        }
    }
}
