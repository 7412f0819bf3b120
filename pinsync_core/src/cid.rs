use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content identifier of an immutable object in a content-addressed store.
///
/// The value is opaque: whether it names a file or a directory tree can only
/// be learned by asking the store. Because stores name downloaded artifacts
/// after the CID, a CID must be usable as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid content identifier {0:?}")]
pub struct InvalidCid(pub String);

impl Cid {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidCid> {
        let value = value.into();
        let usable = !value.is_empty()
            && value != "."
            && value != ".."
            && !value
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control());
        if usable {
            Ok(Cid(value))
        } else {
            Err(InvalidCid(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cid {
    type Err = InvalidCid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::new(s.trim())
    }
}

impl TryFrom<String> for Cid {
    type Error = InvalidCid;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cid::new(value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
