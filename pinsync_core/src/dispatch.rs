use futures::StreamExt;
use tracing::{error, info};

use crate::cid::Cid;
use crate::error::EntryError;
use crate::exit::FailureKind;
use crate::manifest::Manifest;
use crate::paths;
use crate::resolver::{AssetResolver, ObjectKind};

/// Action selected for every entry of a batch by the two skip flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    FetchAndPin,
    PinOnly,
    FetchOnly,
    Ignore,
}

impl Mode {
    pub fn from_flags(skip_fetch: bool, skip_pin: bool) -> Self {
        match (skip_fetch, skip_pin) {
            (false, false) => Mode::FetchAndPin,
            (true, false) => Mode::PinOnly,
            (false, true) => Mode::FetchOnly,
            (true, true) => Mode::Ignore,
        }
    }

    pub fn fetches(self) -> bool {
        matches!(self, Mode::FetchAndPin | Mode::FetchOnly)
    }

    pub fn pins(self) -> bool {
        matches!(self, Mode::FetchAndPin | Mode::PinOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub skip_fetch: bool,
    pub skip_pin: bool,
    /// Validate, classify and log, but leave disk and node untouched.
    pub dry_run: bool,
    /// Upper bound on entries processed concurrently.
    pub jobs: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            skip_fetch: false,
            skip_pin: false,
            dry_run: false,
            jobs: 1,
        }
    }
}

/// What happened to a successfully processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    FetchedAndPinned(ObjectKind),
    Pinned,
    Fetched(ObjectKind),
    Ignored,
    /// Dry run; `kind` is set when the selected mode would fetch.
    Previewed { mode: Mode, kind: Option<ObjectKind> },
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub cid: Cid,
    pub destination: String,
    pub result: Result<EntryAction, EntryError>,
}

/// Outcomes of a batch, in manifest order.
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<EntryOutcome>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[EntryOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True only if no entry failed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntryOutcome, &EntryError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }

    /// Kind of the first failed entry, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failures().next().map(|(_, e)| e.kind())
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
    }
}

/// Applies one [`Mode`] to every entry of a manifest.
///
/// Entries are independent: a failing entry is logged and recorded in the
/// report, and processing continues with the next one.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    resolver: AssetResolver,
    options: DispatchOptions,
}

impl BatchDispatcher {
    pub fn new(resolver: AssetResolver, options: DispatchOptions) -> Self {
        Self { resolver, options }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.options.skip_fetch, self.options.skip_pin)
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub async fn run(&self, manifest: &Manifest) -> BatchReport {
        let outcomes = futures::stream::iter(manifest.iter())
            .map(|(cid, destination)| async move {
                let result = self.run_entry(cid, destination).await;
                if let Err(err) = &result {
                    error!("asset {cid} ({destination:?}): {err}");
                }
                EntryOutcome {
                    cid: cid.clone(),
                    destination: destination.to_owned(),
                    result,
                }
            })
            .buffered(self.options.jobs.max(1))
            .collect::<Vec<_>>()
            .await;
        BatchReport { outcomes }
    }

    /// Processes a single manifest entry.
    pub async fn run_entry(&self, cid: &Cid, destination: &str) -> Result<EntryAction, EntryError> {
        let dest = paths::normalize(destination)?;
        let mode = self.mode();

        match mode {
            Mode::FetchAndPin => info!("fetching and pinning asset {cid} to {dest:?}"),
            Mode::PinOnly => info!("pinning asset {cid} ({dest:?})"),
            Mode::FetchOnly => info!("fetching asset {cid} to {dest:?}"),
            Mode::Ignore => {
                info!("ignoring asset {cid} ({dest:?})");
                return Ok(EntryAction::Ignored);
            }
        }

        if self.options.dry_run {
            let kind = if mode.fetches() {
                let kind = self.resolver.classify(cid).await?;
                info!("dry run: {cid} is a {kind:?}, nothing written");
                Some(kind)
            } else {
                None
            };
            return Ok(EntryAction::Previewed { mode, kind });
        }

        let kind = if mode.fetches() {
            Some(self.resolver.fetch(cid, &dest).await?)
        } else {
            None
        };
        if mode.pins() {
            self.resolver.pin(cid).await?;
        }

        Ok(match (mode, kind) {
            (Mode::FetchAndPin, Some(kind)) => EntryAction::FetchedAndPinned(kind),
            (Mode::FetchOnly, Some(kind)) => EntryAction::Fetched(kind),
            _ => EntryAction::Pinned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table() {
        assert_eq!(Mode::from_flags(false, false), Mode::FetchAndPin);
        assert_eq!(Mode::from_flags(true, false), Mode::PinOnly);
        assert_eq!(Mode::from_flags(false, true), Mode::FetchOnly);
        assert_eq!(Mode::from_flags(true, true), Mode::Ignore);
    }

    #[test]
    fn mode_capabilities() {
        assert!(Mode::FetchAndPin.fetches() && Mode::FetchAndPin.pins());
        assert!(!Mode::PinOnly.fetches() && Mode::PinOnly.pins());
        assert!(Mode::FetchOnly.fetches() && !Mode::FetchOnly.pins());
        assert!(!Mode::Ignore.fetches() && !Mode::Ignore.pins());
    }
}
