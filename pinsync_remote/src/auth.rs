use std::ffi::OsStr;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use ssh2::Session;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::credentials::{AgentProvider, Credential, CredentialOutcome, CredentialProvider};
use crate::known_hosts::{HostVerificationError, TrustedHostKeys};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl RemoteTarget {
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Why a single connection attempt with one credential failed.
#[derive(Error, Debug)]
pub enum AttemptError {
    /// The server is not who it claims to be. Ends the whole run.
    #[error(transparent)]
    HostVerification(HostVerificationError),
    /// The server could not be reached or the handshake failed. Ends the
    /// whole run.
    #[error("{0:#}")]
    Unreachable(anyhow::Error),
    /// The server refused this credential; the next provider is tried.
    #[error("{0:#}")]
    Rejected(anyhow::Error),
}

#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("cannot verify {address}: {source}")]
    HostVerification {
        address: String,
        #[source]
        source: HostVerificationError,
    },

    #[error("cannot reach {address}: {source:#}")]
    Unreachable {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no credential was accepted by {address} ({})", .attempts.join("; "))]
    Exhausted {
        address: String,
        attempts: Vec<String>,
    },
}

/// Establishes one host-verified, authenticated connection.
///
/// Providers are consulted in order. A provider that is unavailable, fails to
/// produce its credential, or whose credential the server rejects hands over
/// to the next one. Host verification failures and unreachable servers end
/// the run immediately.
pub struct RemoteAuthenticator {
    target: RemoteTarget,
    host_keys: TrustedHostKeys,
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl RemoteAuthenticator {
    pub fn new(
        target: RemoteTarget,
        host_keys: TrustedHostKeys,
        providers: Vec<Box<dyn CredentialProvider>>,
    ) -> Self {
        Self {
            target,
            host_keys,
            providers,
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Connects over SSH and returns the authenticated session.
    pub fn authenticate(&self) -> Result<Session, AuthenticationError> {
        self.authenticate_with(|credential| self.dial(credential))
    }

    /// Runs the provider chain, using `dial` to turn each credential into a
    /// connection.
    pub fn authenticate_with<C, F>(&self, mut dial: F) -> Result<C, AuthenticationError>
    where
        F: FnMut(&Credential) -> Result<C, AttemptError>,
    {
        let address = self.target.address();
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let credential = match provider.resolve() {
                CredentialOutcome::Ready(credential) => credential,
                CredentialOutcome::Unavailable(reason) => {
                    debug!("{} unavailable: {reason}", provider.name());
                    attempts.push(format!("{}: {reason}", provider.name()));
                    continue;
                }
                CredentialOutcome::Failed(e) => {
                    warn!("{} failed: {e:#}", provider.name());
                    attempts.push(format!("{}: {e:#}", provider.name()));
                    continue;
                }
            };

            match dial(&credential) {
                Ok(connection) => {
                    info!("authenticated to {address} using {}", provider.name());
                    return Ok(connection);
                }
                Err(AttemptError::Rejected(e)) => {
                    warn!("{address} rejected {}: {e:#}", provider.name());
                    attempts.push(format!("{}: {e:#}", provider.name()));
                }
                Err(AttemptError::HostVerification(source)) => {
                    return Err(AuthenticationError::HostVerification { address, source });
                }
                Err(AttemptError::Unreachable(source)) => {
                    return Err(AuthenticationError::Unreachable { address, source });
                }
            }
        }

        Err(AuthenticationError::Exhausted { address, attempts })
    }

    fn dial(&self, credential: &Credential) -> Result<Session, AttemptError> {
        let target = &self.target;
        let timeout_ms = u32::try_from(target.connect_timeout.as_millis()).unwrap_or(u32::MAX);

        let tcp = connect_tcp(&target.host, target.port, target.connect_timeout)
            .map_err(AttemptError::Unreachable)?;
        let mut session = Session::new()
            .context("cannot create SSH session")
            .map_err(AttemptError::Unreachable)?;
        session.set_timeout(timeout_ms);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {} failed", target.host))
            .map_err(AttemptError::Unreachable)?;

        let (presented, _) = session.host_key().ok_or_else(|| {
            AttemptError::HostVerification(HostVerificationError::NoHostKey {
                host: target.host.clone(),
            })
        })?;
        self.host_keys
            .verify(presented)
            .map_err(AttemptError::HostVerification)?;

        let rejected = |e: anyhow::Error| AttemptError::Rejected(e);
        match credential {
            Credential::Agent { socket } => {
                agent_socket_in_env(socket, std::env::var_os(AgentProvider::SOCKET_ENV).as_deref())
                    .and_then(|()| agent_auth(&session, &target.user))
                    .map_err(rejected)?
            }
            Credential::KeyFile { path, passphrase } => session
                .userauth_pubkey_file(&target.user, None, path, passphrase.as_deref())
                .with_context(|| format!("key {} not accepted", path.display()))
                .map_err(rejected)?,
        }
        if !session.authenticated() {
            return Err(rejected(anyhow!("server did not complete authentication")));
        }

        // Pin commands may run far longer than a handshake.
        session.set_timeout(0);
        Ok(session)
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> anyhow::Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {host}"))?;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(anyhow::Error::new(e).context(format!("cannot connect to {addr}"))),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("{host} resolved to no addresses")))
}

/// libssh2 always talks to the agent named by `SSH_AUTH_SOCK`, so an agent
/// credential for any other socket cannot be honoured.
fn agent_socket_in_env(socket: &Path, env: Option<&OsStr>) -> anyhow::Result<()> {
    match env {
        Some(current) if Path::new(current) == socket => Ok(()),
        Some(current) => Err(anyhow!(
            "agent socket {} is not the one in {} ({})",
            socket.display(),
            AgentProvider::SOCKET_ENV,
            Path::new(current).display()
        )),
        None => Err(anyhow!(
            "agent socket {} given but {} is not set",
            socket.display(),
            AgentProvider::SOCKET_ENV
        )),
    }
}

fn agent_auth(session: &Session, user: &str) -> anyhow::Result<()> {
    let mut agent = session.agent()?;
    agent.connect().context("cannot connect to SSH agent")?;
    agent.list_identities()?;
    for identity in agent.identities()? {
        match agent.userauth(user, &identity) {
            Ok(()) => {
                debug!("agent identity {:?} accepted", identity.comment());
                return Ok(());
            }
            Err(e) => debug!("agent identity {:?} refused: {e}", identity.comment()),
        }
    }
    Err(anyhow!("no agent identity was accepted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_socket_must_be_the_environment_socket() {
        let socket = Path::new("/run/user/1000/agent.sock");
        assert!(agent_socket_in_env(socket, Some(OsStr::new("/run/user/1000/agent.sock"))).is_ok());

        let err = agent_socket_in_env(socket, Some(OsStr::new("/tmp/other.sock"))).unwrap_err();
        assert!(err.to_string().contains("/tmp/other.sock"));
        assert!(agent_socket_in_env(socket, None).is_err());
    }
}
