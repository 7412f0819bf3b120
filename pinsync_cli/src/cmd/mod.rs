use std::fmt::Display;
use std::path::{Path, PathBuf};

use pinsync_core::{FailureKind, Manifest, ManifestError};
use tracing::debug;

use crate::config::SyncConfig;

mod connect;
mod fetch;
mod pin_remote;
mod put;

pub use connect::run_connect;
pub use fetch::run_fetch;
pub use pin_remote::run_pin_remote;
pub use put::run_put;

/// A failed command together with the exit status it maps to.
#[derive(Debug)]
pub struct CommandError {
    pub kind: FailureKind,
    pub error: anyhow::Error,
}

impl CommandError {
    pub fn new(kind: FailureKind, error: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }
}

pub type CommandResult<T = ()> = Result<T, CommandError>;

/// Tags an error with the failure kind it should exit with.
pub trait FailWith<T> {
    fn fail_with(self, kind: FailureKind) -> CommandResult<T>;
}

impl<T, E: Into<anyhow::Error>> FailWith<T> for Result<T, E> {
    fn fail_with(self, kind: FailureKind) -> CommandResult<T> {
        self.map_err(|e| CommandError::new(kind, e))
    }
}

pub async fn run_command(cmd: crate::Commands, config_file: &Path, verbose: bool) -> CommandResult {
    if let crate::Commands::Config { cmd } = cmd {
        return cmd.run(config_file).fail_with(FailureKind::Usage);
    }

    let config = SyncConfig::load(config_file).fail_with(FailureKind::Usage)?;
    debug!("using config {config:?}");

    match cmd {
        crate::Commands::Fetch(args) => run_fetch(args, &config, verbose).await,
        crate::Commands::Put(args) => run_put(args, &config).await,
        crate::Commands::PinRemote(args) => run_pin_remote(args, &config).await,
        crate::Commands::Connect(args) => run_connect(args, &config).await,
        crate::Commands::Config { .. } => Ok(()),
    }
}

/// Loads every manifest before anything is processed, so a bad file aborts
/// the run up front. With no paths a single manifest is read from stdin.
pub fn read_manifests(paths: &[PathBuf]) -> Result<Vec<(String, Manifest)>, ManifestError> {
    if paths.is_empty() {
        let manifest = Manifest::read_from(std::io::stdin().lock())?;
        return Ok(vec![("<stdin>".to_owned(), manifest)]);
    }
    paths
        .iter()
        .map(|path| Ok((path.display().to_string(), Manifest::read_file(path)?)))
        .collect()
}

/// Summary error for a batch in which `failed` of `total` items failed.
pub fn batch_failed(kind: FailureKind, failed: usize, total: usize, what: impl Display) -> CommandError {
    CommandError::new(kind, anyhow::anyhow!("{failed} of {total} {what} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_travels_with_the_error() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = result.fail_with(FailureKind::Output).unwrap_err();
        assert_eq!(err.kind, FailureKind::Output);
        assert_eq!(err.kind.code(), 8);
        assert_eq!(err.error.to_string(), "boom");
    }

    #[test]
    fn manifests_load_in_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        std::fs::write(&first, r#"{"QmB": "b", "QmA": "a"}"#).unwrap();
        std::fs::write(&second, r#"{"QmC": "c"}"#).unwrap();

        let manifests = read_manifests(&[first.clone(), second]).unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].0, first.display().to_string());
        let cids: Vec<_> = manifests[0].1.cids().map(|c| c.as_str()).collect();
        assert_eq!(cids, ["QmB", "QmA"]);
    }

    #[test]
    fn one_bad_manifest_fails_the_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"QmA": "a"}"#).unwrap();
        let missing = dir.path().join("missing.json");

        assert!(matches!(
            read_manifests(&[good, missing]),
            Err(ManifestError::Read { .. })
        ));
    }
}
