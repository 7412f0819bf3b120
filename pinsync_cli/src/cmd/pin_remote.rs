use anyhow::anyhow;
use pinsync_core::{Cid, FailureKind, Manifest};
use pinsync_remote::{
    AgentProvider, AuthenticationError, CredentialProvider, KeyFileProvider, PinReport,
    RemoteAuthenticator, RemotePinner, RemoteTarget, TrustedHostKeys, TtyPrompt,
};
use tracing::{debug, info};

use super::{CommandError, CommandResult, FailWith, batch_failed};
use crate::PinRemoteArgs;
use crate::config::SyncConfig;

pub async fn run_pin_remote(args: PinRemoteArgs, config: &SyncConfig) -> CommandResult {
    // The manifest must be fully read before the passphrase prompt can run.
    let cids: Vec<Cid> = if args.cids.is_empty() {
        Manifest::read_from(std::io::stdin().lock())
            .fail_with(FailureKind::Manifest)?
            .cids()
            .cloned()
            .collect()
    } else {
        args.cids
    };
    if cids.is_empty() {
        info!("nothing to pin");
        return Ok(());
    }

    let remote = &config.remote;
    let user = args.user.or_else(|| remote.user_or_env()).ok_or_else(|| {
        CommandError::new(
            FailureKind::Usage,
            anyhow!("no remote user given and $USER is not set"),
        )
    })?;
    let private_key = args
        .private_key
        .or_else(|| remote.private_key_or_default())
        .ok_or_else(|| {
            CommandError::new(
                FailureKind::Usage,
                anyhow!("no private key given and the home directory is unknown"),
            )
        })?;
    let known_hosts = remote.known_hosts_for(&private_key);
    let target = RemoteTarget {
        user,
        host: args.domain.unwrap_or_else(|| remote.domain.clone()),
        port: args.port.unwrap_or(remote.port),
        connect_timeout: remote.connect_timeout(),
    };
    let pin_command = remote.pin_command.clone();
    debug!("pinning {} CIDs on {}", cids.len(), target.address());

    // ssh2 is blocking; authentication and every pin run on one worker thread.
    let report = tokio::task::spawn_blocking(move || -> CommandResult<PinReport> {
        let host_keys = TrustedHostKeys::load(&known_hosts, &target.host, target.port)
            .fail_with(FailureKind::Authentication)?;
        let providers: Vec<Box<dyn CredentialProvider>> = vec![
            Box::new(AgentProvider::from_env()),
            Box::new(KeyFileProvider::new(private_key, TtyPrompt)),
        ];
        let authenticator = RemoteAuthenticator::new(target, host_keys, providers);
        let session = authenticator.authenticate().map_err(|e| {
            let kind = match e {
                AuthenticationError::Unreachable { .. } => FailureKind::Connectivity,
                _ => FailureKind::Authentication,
            };
            CommandError::new(kind, e)
        })?;

        let pinner = RemotePinner::new(session).with_command(pin_command);
        Ok(pinner.pin_all_with(&cids, |cid, result| {
            if result.is_ok() {
                println!("pinned {cid}");
            }
        }))
    })
    .await
    .fail_with(FailureKind::RemotePin)??;

    if report.is_success() {
        Ok(())
    } else {
        Err(batch_failed(
            FailureKind::RemotePin,
            report.failures().count(),
            report.len(),
            "pins",
        ))
    }
}
