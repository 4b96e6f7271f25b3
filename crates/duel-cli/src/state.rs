//! # State File
//!
//! The CLI keeps one JSON file holding the escrow configuration, the escrow
//! snapshot, every in-memory registry, the simulated block clock, and the
//! event log. Each command loads
//! it into a [`Session`], runs one operation, and writes it back.
//!
//! The file is only rewritten after a command succeeds, so a rejected
//! operation leaves it untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use duel_core::Address;
use duel_escrow::{
    AssetRegistry, ClockEntropy, ClockState, DuelEscrow, EntropySource, EscrowConfig,
    EscrowSnapshot, EventLog, EventRecord, InMemoryAssetRegistry, RegistrySnapshot,
    TracingEventSink,
};

/// On-disk contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    /// Escrow configuration fixed at `init`.
    pub config: EscrowConfig,
    /// Escrow table and counters.
    pub escrow: EscrowSnapshot,
    /// In-memory registries, one per address.
    pub registries: Vec<RegistrySnapshot>,
    /// Block clock used by unpinned `resolve`.
    #[serde(default)]
    pub clock: ClockState,
    /// Every event published so far.
    pub events: Vec<EventRecord>,
}

impl StateFile {
    /// Read and parse a state file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "state file not found: {} (run `duel init` first)",
                path.display()
            );
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state file {}", path.display()))
    }

    /// Write the state file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// A live escrow rebuilt from a [`StateFile`].
pub struct Session {
    path: PathBuf,
    /// The escrow.
    pub escrow: DuelEscrow,
    /// Registries by address, in file order.
    pub registries: Vec<Arc<InMemoryAssetRegistry>>,
    /// Event log carried over from the file.
    pub log: Arc<EventLog>,
    /// Block clock resumed from the file. Advances only when it is the
    /// escrow's entropy source.
    pub clock: Arc<ClockEntropy>,
}

impl Session {
    /// Load the state file at `path` and rebuild the escrow. `entropy`
    /// replaces the default clock source when given.
    pub fn open(path: &Path, entropy: Option<Arc<dyn EntropySource>>) -> Result<Self> {
        let state = StateFile::load(path)?;
        let registries: Vec<Arc<InMemoryAssetRegistry>> = state
            .registries
            .into_iter()
            .map(|snapshot| Arc::new(InMemoryAssetRegistry::from_snapshot(snapshot)))
            .collect();
        let log = Arc::new(EventLog::with_records(state.events));
        let clock = Arc::new(ClockEntropy::resume(state.clock));

        let mut builder = DuelEscrow::builder(state.config)
            .events(log.clone())
            .events(Arc::new(TracingEventSink))
            .restore(state.escrow);
        for registry in &registries {
            builder = builder.registry(registry.clone());
        }
        builder = match entropy {
            Some(entropy) => builder.entropy(entropy),
            None => builder.entropy(clock.clone()),
        };
        let escrow = builder.build().context("failed to restore escrow")?;

        Ok(Self {
            path: path.to_path_buf(),
            escrow,
            registries,
            log,
            clock,
        })
    }

    /// The in-memory registry at `address`.
    pub fn registry(&self, address: &Address) -> Result<&InMemoryAssetRegistry> {
        match self.registries.iter().find(|r| r.address() == *address) {
            Some(registry) => Ok(registry.as_ref()),
            None => bail!("no registry at {address} in this state file"),
        }
    }

    /// Persist the current state back to the file it was loaded from.
    pub fn save(&self) -> Result<()> {
        let state = StateFile {
            config: *self.escrow.config(),
            escrow: self.escrow.snapshot(),
            registries: self.registries.iter().map(|r| r.snapshot()).collect(),
            clock: self.clock.state(),
            events: self.log.records(),
        };
        state.save(&self.path)
    }
}
