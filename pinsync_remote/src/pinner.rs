use std::io::Read;

use pinsync_core::Cid;
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_PIN_COMMAND: &str = "ipfs pin add";

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub status: i32,
    /// Standard output and standard error, interleaved as the remote wrote
    /// them.
    pub output: String,
}

/// Runs commands on an authenticated connection.
///
/// Every call must use a session of its own; sessions are never reused
/// between commands.
pub trait RemoteExec {
    fn exec(&self, command: &str) -> anyhow::Result<ExecOutput>;
}

impl RemoteExec for ssh2::Session {
    fn exec(&self, command: &str) -> anyhow::Result<ExecOutput> {
        let mut channel = self.channel_session()?;
        // A single stream cannot stall on a full stderr window.
        channel.handle_extended_data(ssh2::ExtendedData::Merge)?;
        channel.exec(command)?;
        let mut output = String::new();
        channel.read_to_string(&mut output)?;
        channel.wait_close()?;
        Ok(ExecOutput {
            status: channel.exit_status()?,
            output,
        })
    }
}

#[derive(Error, Debug)]
pub enum PinError {
    #[error("cannot run pin command for {cid}: {source:#}")]
    Session {
        cid: Cid,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to pin {cid} (exit status {status}): {}", .output.trim())]
    Remote {
        cid: Cid,
        status: i32,
        output: String,
    },
}

/// Per-CID results of a remote pinning run, in request order.
#[derive(Debug, Default)]
pub struct PinReport {
    outcomes: Vec<(Cid, Result<(), PinError>)>,
}

impl PinReport {
    pub fn outcomes(&self) -> &[(Cid, Result<(), PinError>)] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    pub fn pinned(&self) -> impl Iterator<Item = &Cid> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(cid, _)| cid)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Cid, &PinError)> {
        self.outcomes
            .iter()
            .filter_map(|(cid, r)| r.as_ref().err().map(|e| (cid, e)))
    }
}

pub struct RemotePinner<E> {
    exec: E,
    pin_command: String,
}

impl<E: RemoteExec> RemotePinner<E> {
    pub fn new(exec: E) -> Self {
        Self {
            exec,
            pin_command: DEFAULT_PIN_COMMAND.to_owned(),
        }
    }

    pub fn with_command(mut self, pin_command: impl Into<String>) -> Self {
        self.pin_command = pin_command.into();
        self
    }

    pub fn exec(&self) -> &E {
        &self.exec
    }

    pub fn command_for(&self, cid: &Cid) -> String {
        format!("{} {}", self.pin_command, shell_quote(cid.as_str()))
    }

    /// Pins one CID. Never retried.
    pub fn pin(&self, cid: &Cid) -> Result<(), PinError> {
        let output = self
            .exec
            .exec(&self.command_for(cid))
            .map_err(|source| PinError::Session {
                cid: cid.clone(),
                source,
            })?;
        if output.status == 0 {
            Ok(())
        } else {
            Err(PinError::Remote {
                cid: cid.clone(),
                status: output.status,
                output: output.output,
            })
        }
    }

    /// Pins every CID in order. A failure is recorded and the next CID is
    /// still attempted.
    pub fn pin_all<'a>(&self, cids: impl IntoIterator<Item = &'a Cid>) -> PinReport {
        self.pin_all_with(cids, |_, _| {})
    }

    /// Like [`pin_all`](Self::pin_all), calling `on_result` as soon as each
    /// CID's pin has finished.
    pub fn pin_all_with<'a, F>(&self, cids: impl IntoIterator<Item = &'a Cid>, mut on_result: F) -> PinReport
    where
        F: FnMut(&Cid, &Result<(), PinError>),
    {
        let outcomes = cids
            .into_iter()
            .map(|cid| {
                let result = self.pin(cid);
                match &result {
                    Ok(()) => info!("pinned {cid}"),
                    Err(e) => error!("{e}"),
                }
                on_result(cid, &result);
                (cid.clone(), result)
            })
            .collect();
        PinReport { outcomes }
    }
}

/// Quotes `arg` for a POSIX shell unless it is made only of safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/@%+=".contains(c));
    if safe {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_leaves_cids_alone() {
        assert_eq!(
            shell_quote("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"),
            "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
        );
        assert_eq!(shell_quote("bafy-x_1.2"), "bafy-x_1.2");
    }

    #[test]
    fn quoting_neutralizes_shell_syntax() {
        assert_eq!(shell_quote("a;rm"), "'a;rm'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(x)"), "'$(x)'");
        assert_eq!(shell_quote(""), "''");
    }
}
