use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::error::ManifestError;

const STDIN_ORIGIN: &str = "standard input";
const STDOUT_TARGET: &str = "standard output";

/// JSON object mapping content identifiers to destination paths.
///
/// Entry order follows the source document so that batch processing and
/// its log output are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: IndexMap<Cid, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `cid -> path`, replacing the path in place if the CID is
    /// already present. Returns the previous path.
    pub fn insert(&mut self, cid: Cid, path: impl Into<String>) -> Option<String> {
        self.entries.insert(cid, path.into())
    }

    pub fn get(&self, cid: &Cid) -> Option<&str> {
        self.entries.get(cid).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cid, &str)> {
        self.entries.iter().map(|(cid, path)| (cid, path.as_str()))
    }

    pub fn cids(&self) -> impl Iterator<Item = &Cid> {
        self.entries.keys()
    }

    /// Parses a manifest from raw JSON. `origin` names the source in errors.
    pub fn from_json(blob: &[u8], origin: &str) -> Result<Self, ManifestError> {
        serde_json::from_slice(blob).map_err(|source| ManifestError::Parse {
            origin: origin.to_owned(),
            source,
        })
    }

    pub fn read_from(mut reader: impl Read) -> Result<Self, ManifestError> {
        let mut blob = Vec::new();
        reader
            .read_to_end(&mut blob)
            .map_err(|source| ManifestError::Read {
                origin: STDIN_ORIGIN.to_owned(),
                source,
            })?;
        Self::from_json(&blob, STDIN_ORIGIN)
    }

    pub fn read_file(path: &Path) -> Result<Self, ManifestError> {
        let origin = path.display().to_string();
        let blob = std::fs::read(path).map_err(|source| ManifestError::Read {
            origin: origin.clone(),
            source,
        })?;
        Self::from_json(&blob, &origin)
    }

    /// Like [`Manifest::read_file`], but a missing file yields an empty
    /// manifest. Any other failure is still an error.
    pub fn read_file_or_default(path: &Path) -> Result<Self, ManifestError> {
        match std::fs::metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            _ => Self::read_file(path),
        }
    }

    /// Two-space indented JSON followed by a newline.
    pub fn to_json_pretty(&self) -> String {
        // A map of strings to strings always serializes.
        let mut out = serde_json::to_string_pretty(&self.entries).unwrap_or_default();
        out.push('\n');
        out
    }

    pub fn write_to(&self, mut writer: impl Write, target: &str) -> Result<(), ManifestError> {
        writer
            .write_all(self.to_json_pretty().as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|source| ManifestError::Write {
                target: target.to_owned(),
                source,
            })
    }

    /// Writes the manifest to `path`, creating or truncating it, or to
    /// standard output when no path is given.
    pub fn save(&self, path: Option<&Path>) -> Result<(), ManifestError> {
        match path {
            None => self.write_to(std::io::stdout().lock(), STDOUT_TARGET),
            Some(path) => {
                let target = path.display().to_string();
                let file = std::fs::File::create(path).map_err(|source| ManifestError::Write {
                    target: target.clone(),
                    source,
                })?;
                self.write_to(file, &target)
            }
        }
    }
}

impl FromIterator<(Cid, String)> for Manifest {
    fn from_iter<T: IntoIterator<Item = (Cid, String)>>(iter: T) -> Self {
        Manifest {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> Cid {
        Cid::new(s).unwrap()
    }

    #[test]
    fn preserves_document_order() {
        let m = Manifest::from_json(br#"{"Qmz": "z.txt", "Qma": "a.txt", "Qmm": "m/"}"#, "test")
            .unwrap();
        let order: Vec<&str> = m.cids().map(Cid::as_str).collect();
        assert_eq!(order, ["Qmz", "Qma", "Qmm"]);
    }

    #[test]
    fn pretty_output_uses_two_space_indent() {
        let mut m = Manifest::new();
        m.insert(cid("Qm1"), "data/one.csv");
        m.insert(cid("Qm2"), "data/two");
        assert_eq!(
            m.to_json_pretty(),
            "{\n  \"Qm1\": \"data/one.csv\",\n  \"Qm2\": \"data/two\"\n}\n"
        );
    }

    #[test]
    fn reinserting_replaces_path_without_moving_entry() {
        let mut m = Manifest::new();
        m.insert(cid("Qm1"), "old");
        m.insert(cid("Qm2"), "other");
        assert_eq!(m.insert(cid("Qm1"), "new").as_deref(), Some("old"));
        let entries: Vec<_> = m.iter().collect();
        assert_eq!(entries[0].1, "new");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for blob in [&b"[1, 2]"[..], b"{\"Qm1\": 3}", b"not json", b"{\"a/b\": \"x\"}"] {
            let err = Manifest::from_json(blob, "payload").unwrap_err();
            assert!(matches!(err, ManifestError::Parse { .. }), "{err}");
        }
    }

    #[test]
    fn missing_file_yields_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manifest::read_file_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn save_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = Manifest::new();
        m.insert(cid("Qm1"), "a/b/out.txt");
        m.save(Some(&path)).unwrap();
        assert_eq!(Manifest::read_file(&path).unwrap(), m);
    }
}
