//! `ContentStore` implementation talking to a Kubo-compatible IPFS node over
//! its HTTP RPC API (`/api/v0/...`).
//!
//! Besides the store itself this crate knows how to discover a gateway's
//! advertised peer addresses and ask the local node to dial one of them.

mod archive;
mod config;
mod error;
pub mod gateway;
mod rpc;
mod store;

pub use config::KuboConfig;
pub use error::{KuboError, SwarmConnectError};
pub use gateway::{GatewayAddrs, GatewayError};
pub use store::KuboStore;
