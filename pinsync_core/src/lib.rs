//! Core pinsync engine.
//!
//! This crate holds everything that does not depend on a particular content
//! store or transport:
//!
//! - Content identifiers (`cid::Cid`) and manifests (`manifest::Manifest`),
//!   the JSON documents mapping CIDs to destination paths
//! - The destination path normalizer (`paths::normalize`), the only place
//!   that decides whether a manifest may write to a given location
//! - The `ContentStore` trait consumed by the engine; implementations live in
//!   `pinsync_store_kubo` (HTTP RPC) and `pinsync_store_memory` (tests)
//! - `AssetResolver`, which implements fetch/put/pin on top of a store
//! - `BatchDispatcher`, which drives a resolver over a whole manifest with
//!   per-entry failure isolation
//! - The error taxonomy and the closed set of process failure kinds

pub mod cid;
pub mod dispatch;
pub mod error;
pub mod exit;
pub mod manifest;
pub mod paths;
pub mod resolver;
pub mod store;

pub use cid::Cid;
pub use dispatch::{BatchDispatcher, BatchReport, DispatchOptions, EntryAction, EntryOutcome, Mode};
pub use error::{ConnectivityError, EntryError, ManifestError, PathSafetyError, TransferError};
pub use exit::FailureKind;
pub use manifest::Manifest;
pub use resolver::{AssetResolver, ObjectKind};
pub use store::{ContentStore, Link, StoreResult};
