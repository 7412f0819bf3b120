use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use clap_verbosity_flag::WarnLevel;
use directories::ProjectDirs;
use pinsync_core::{Cid, FailureKind};
use tracing::error;
use tracing::level_filters::LevelFilter;

use crate::init_config::CmdConfig;

mod cmd;
mod config;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<WarnLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and/or pin every asset listed in one or more manifests
    Fetch(FetchArgs),
    /// Add local files or directories to the node and record them in a manifest
    Put(PutArgs),
    /// Pin CIDs on a remote node over SSH
    PinRemote(PinRemoteArgs),
    /// Connect the local node to a gateway's IPFS peer
    Connect(ConnectArgs),
    /// Modify the pinsync config file
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Manifest files to process in order; reads one manifest from stdin if none are given
    #[arg(value_name = "MANIFEST")]
    manifests: Vec<PathBuf>,
    /// RPC API address of the IPFS node
    #[arg(short, long, value_name = "URL")]
    api: Option<String>,
    /// Do not download assets
    #[arg(long, action = ArgAction::SetTrue)]
    skip_fetch: bool,
    /// Do not pin assets on the node
    #[arg(long, action = ArgAction::SetTrue)]
    skip_pin: bool,
    /// Validate and classify every entry without touching disk or node
    #[arg(short = 'n', long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Max number of entries processed concurrently
    #[arg(short, long, value_name = "COUNT")]
    jobs: Option<NonZeroUsize>,
}

#[derive(Args)]
struct PutArgs {
    /// Files or directories to add
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
    /// Manifest file to update; printed to stdout if omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// RPC API address of the IPFS node
    #[arg(short, long, value_name = "URL")]
    api: Option<String>,
}

#[derive(Args)]
struct PinRemoteArgs {
    /// CIDs to pin; read from a manifest on stdin if none are given
    #[arg(value_name = "CID")]
    cids: Vec<Cid>,
    /// Remote user name
    #[arg(short, long)]
    user: Option<String>,
    /// Remote host
    #[arg(short, long)]
    domain: Option<String>,
    /// Remote SSH port
    #[arg(short, long)]
    port: Option<u16>,
    /// Private key file; known_hosts is looked up next to it
    #[arg(short = 'i', long = "identity", value_name = "KEY")]
    private_key: Option<PathBuf>,
}

#[derive(Args)]
struct ConnectArgs {
    /// Gateway whose peer addresses should be dialed
    #[arg(short, long, value_name = "URL")]
    gateway: Option<String>,
    /// API path on the gateway
    #[arg(long, value_name = "PATH")]
    gateway_api: Option<String>,
    /// RPC API address of the local IPFS node
    #[arg(short, long, value_name = "URL")]
    api: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(FailureKind::Usage.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let max_level = cli.verbosity.tracing_level_filter();
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();

    // Config lives under ~/.config/pinsync/config.toml unless overridden.
    let config_file = match cli.config {
        Some(path) => path,
        None => match ProjectDirs::from("", "", "pinsync") {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => {
                error!("failed to determine config directory path, pass --config");
                return ExitCode::from(FailureKind::Usage.code());
            }
        },
    };

    let verbose = max_level >= LevelFilter::INFO;
    match cmd::run_command(cli.cmd, &config_file, verbose).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e.error);
            ExitCode::from(e.kind.code())
        }
    }
}
