//! Remote pinning over SSH.
//!
//! A run goes through two strictly ordered phases:
//!
//! 1. [`RemoteAuthenticator`] walks an ordered list of credential providers
//!    (SSH agent, then private key file) until one yields a connection whose
//!    server key is in the [`TrustedHostKeys`] set. It reaches exactly one
//!    terminal state and is never re-run mid-batch.
//! 2. [`RemotePinner`] runs the node's pin command once per CID, each on a
//!    fresh channel of the authenticated connection.
//!
//! Everything here is blocking; async callers should run it on a blocking
//! thread.

mod auth;
mod credentials;
mod known_hosts;
mod pinner;

pub use auth::{AttemptError, AuthenticationError, RemoteAuthenticator, RemoteTarget};
pub use credentials::{
    AgentProvider, Credential, CredentialOutcome, CredentialProvider, KeyFileProvider,
    PassphrasePrompt, TtyPrompt,
};
pub use known_hosts::{HostVerificationError, TrustedHostKeys};
pub use pinner::{DEFAULT_PIN_COMMAND, ExecOutput, PinError, PinReport, RemoteExec, RemotePinner};
