use pinsync_core::{
    AssetResolver, BatchDispatcher, BatchReport, DispatchOptions, FailureKind, Mode,
};
use pinsync_store_kubo::KuboStore;
use tracing::{debug, info, warn};

use super::{CommandResult, FailWith, batch_failed, read_manifests};
use crate::FetchArgs;
use crate::config::SyncConfig;

pub async fn run_fetch(args: FetchArgs, config: &SyncConfig, verbose: bool) -> CommandResult {
    let manifests = read_manifests(&args.manifests).fail_with(FailureKind::Manifest)?;

    let options = DispatchOptions {
        skip_fetch: args.skip_fetch,
        skip_pin: args.skip_pin,
        dry_run: args.dry_run,
        jobs: args.jobs.map_or(config.fetch.jobs, |jobs| jobs.get()),
    };
    if Mode::from_flags(options.skip_fetch, options.skip_pin) == Mode::Ignore && !verbose {
        warn!("--skip-fetch and --skip-pin are both set: no disk or node modification will happen");
    }

    let store = KuboStore::connect(&config.kubo(args.api))
        .await
        .fail_with(FailureKind::Connectivity)?;
    let dispatcher = BatchDispatcher::new(AssetResolver::new(store), options);

    let mut report = BatchReport::default();
    for (origin, manifest) in &manifests {
        debug!("processing {} entries from {origin}", manifest.len());
        report.merge(dispatcher.run(manifest).await);
    }

    match report.failure_kind() {
        None => {
            info!("processed {} assets", report.len());
            Ok(())
        }
        Some(kind) => Err(batch_failed(kind, report.failures().count(), report.len(), "assets")),
    }
}
