use std::time::Duration;

use anyhow::anyhow;
use pinsync_core::FailureKind;
use pinsync_store_kubo::KuboStore;
use pinsync_store_kubo::gateway;
use tracing::info;

use super::{CommandError, CommandResult, FailWith};
use crate::ConnectArgs;
use crate::config::SyncConfig;

const SWARM_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn run_connect(args: ConnectArgs, config: &SyncConfig) -> CommandResult {
    let kubo = config.kubo(args.api);
    let store = KuboStore::new(&kubo).fail_with(FailureKind::Usage)?;
    if !store.is_up().await {
        return Err(CommandError::new(
            FailureKind::Connectivity,
            anyhow!("IPFS node at {} is not running", store.api_base()),
        ));
    }

    let url = gateway::addresses_url(
        args.gateway.as_deref().unwrap_or(&config.gateway.url),
        args.gateway_api.as_deref().unwrap_or(&config.gateway.api),
    )
    .fail_with(FailureKind::Usage)?;
    let client = reqwest::Client::builder()
        .connect_timeout(kubo.connect_timeout)
        .build()
        .fail_with(FailureKind::Usage)?;
    let addrs = gateway::fetch_addresses(&client, url.clone())
        .await
        .fail_with(FailureKind::Connectivity)?;
    let addr = addrs.choose().ok_or_else(|| {
        CommandError::new(
            FailureKind::Connectivity,
            anyhow!("gateway {url} advertised no peer addresses"),
        )
    })?;

    info!("connecting to {addr}");
    store
        .swarm_connect(addr, SWARM_CONNECT_TIMEOUT)
        .await
        .fail_with(FailureKind::Connectivity)?;
    println!("connected to {addr}");
    Ok(())
}
