use std::fmt;

/// Closed set of reasons a pinsync invocation can fail.
///
/// Each kind maps to a distinct, stable process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Bad invocation or unusable configuration.
    Usage,
    /// Content store, gateway or remote node unreachable.
    Connectivity,
    /// Manifest unreadable or malformed.
    Manifest,
    /// A destination was absolute or escaped the sync root.
    PathSafety,
    /// A fetch, add or pin against the content store failed.
    Transfer,
    /// No credential produced a host-verified remote connection.
    Authentication,
    /// A remote pin command failed.
    RemotePin,
    /// The resulting manifest could not be written.
    Output,
}

impl FailureKind {
    pub const fn code(self) -> u8 {
        match self {
            FailureKind::Usage => 1,
            FailureKind::Connectivity => 2,
            FailureKind::Manifest => 3,
            FailureKind::PathSafety => 4,
            FailureKind::Transfer => 5,
            FailureKind::Authentication => 6,
            FailureKind::RemotePin => 7,
            FailureKind::Output => 8,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Usage => "usage",
            FailureKind::Connectivity => "connectivity",
            FailureKind::Manifest => "manifest",
            FailureKind::PathSafety => "path safety",
            FailureKind::Transfer => "transfer",
            FailureKind::Authentication => "authentication",
            FailureKind::RemotePin => "remote pin",
            FailureKind::Output => "output",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let all = [
            FailureKind::Usage,
            FailureKind::Connectivity,
            FailureKind::Manifest,
            FailureKind::PathSafety,
            FailureKind::Transfer,
            FailureKind::Authentication,
            FailureKind::RemotePin,
            FailureKind::Output,
        ];
        let codes: HashSet<u8> = all.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
    }
}
