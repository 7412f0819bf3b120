use std::{fs, io::Write, path::Path};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

use crate::config::SyncConfig;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and fills in missing defaults
    Init,
}

impl CmdConfig {
    pub fn run(self, config_file: &Path) -> anyhow::Result<()> {
        let existing = if config_file.exists() {
            fs::read_to_string(config_file)?
        } else {
            if let Some(parent) = config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            String::new()
        };

        let doc = match self {
            Self::Init => init_document(&existing)?,
        };

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

/// Adds every missing section and key with its default value. Keys that are
/// already present keep their value and formatting.
fn init_document(existing: &str) -> anyhow::Result<DocumentMut> {
    let mut doc = existing
        .parse::<DocumentMut>()
        .context("could not parse config file")?;
    let defaults = SyncConfig::default();

    let node = section(&mut doc, "node", "RPC API of the local IPFS node")?;
    node.entry("api_url").or_insert(value(defaults.node.api_url));
    node.entry("connect_timeout_ms")
        .or_insert(value(millis(defaults.node.connect_timeout_ms)));

    let fetch = section(&mut doc, "fetch", "Manifest entries processed concurrently")?;
    fetch
        .entry("jobs")
        .or_insert(value(i64::try_from(defaults.fetch.jobs).unwrap_or(1)));

    let remote = section(
        &mut doc,
        "remote",
        "Remote pinning over SSH. `user` defaults to $USER, `private_key` to\n\
         # ~/.ssh/id_rsa and `known_hosts` to the known_hosts file next to the key.",
    )?;
    remote.entry("domain").or_insert(value(defaults.remote.domain));
    remote
        .entry("port")
        .or_insert(value(i64::from(defaults.remote.port)));
    remote
        .entry("pin_command")
        .or_insert(value(defaults.remote.pin_command));
    remote
        .entry("connect_timeout_ms")
        .or_insert(value(millis(defaults.remote.connect_timeout_ms)));

    let gateway = section(&mut doc, "gateway", "Gateway used by `pinsync connect`")?;
    gateway.entry("url").or_insert(value(defaults.gateway.url));
    gateway.entry("api").or_insert(value(defaults.gateway.api));

    Ok(doc)
}

fn section<'a>(doc: &'a mut DocumentMut, name: &str, comment: &str) -> anyhow::Result<&'a mut Table> {
    if !doc.contains_key(name) {
        let mut table = Table::new();
        table.decor_mut().set_prefix(format!("\n# {comment}\n"));
        doc.insert(name, Item::Table(table));
    }
    doc.get_mut(name)
        .and_then(Item::as_table_mut)
        .with_context(|| format!("`{name}` in the config file is not a table"))
}

fn millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
