use pinsync_core::{AssetResolver, FailureKind, Manifest};
use pinsync_store_kubo::KuboStore;
use tracing::{error, info};

use super::{CommandResult, FailWith, batch_failed};
use crate::PutArgs;
use crate::config::SyncConfig;

pub async fn run_put(args: PutArgs, config: &SyncConfig) -> CommandResult {
    // Entries already recorded in the output manifest are kept.
    let mut manifest = match &args.output {
        Some(path) => Manifest::read_file_or_default(path).fail_with(FailureKind::Manifest)?,
        None => Manifest::new(),
    };

    let store = KuboStore::connect(&config.kubo(args.api))
        .await
        .fail_with(FailureKind::Connectivity)?;
    let resolver = AssetResolver::new(store);

    let mut failed = 0;
    for path in &args.paths {
        match resolver.put(path).await {
            Ok(cid) => {
                info!("added {path:?} as {cid}");
                manifest.insert(cid, path.to_string_lossy());
            }
            Err(e) => {
                error!("cannot add {path:?}: {e}");
                failed += 1;
            }
        }
    }

    manifest
        .save(args.output.as_deref())
        .fail_with(FailureKind::Output)?;

    if failed > 0 {
        return Err(batch_failed(FailureKind::Transfer, failed, args.paths.len(), "paths"));
    }
    Ok(())
}
