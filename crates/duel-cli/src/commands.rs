//! # Duel Subcommands
//!
//! - `init`: Create a state file with an escrow and empty registries.
//! - `mint`: Mint an asset in an in-memory registry.
//! - `approve`: Approve the escrow to move one asset.
//! - `create`: Open a duel with an asset.
//! - `join`: Join a pending duel with an asset.
//! - `withdraw`: Cancel a pending duel.
//! - `resolve`: Resolve an ongoing duel.
//! - `claim`: Collect an asset held after a refused return.
//! - `show`: Print live duels, or one duel.
//! - `events`: Print the event log.
//!
//! Callers are given explicitly with `--caller`; the CLI has no notion of a
//! signed-in identity.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use duel_core::{sha256_raw, Address, AssetId, AssetRef, DuelId};
use duel_escrow::{
    ClockState, EntropySource, EscrowConfig, FixedEntropy, RegistrySnapshot,
};

use crate::state::{Session, StateFile};

/// Duel subcommands.
#[derive(Subcommand, Debug)]
pub enum DuelCommand {
    /// Create a new state file.
    Init {
        /// Address of an in-memory registry to create. Repeatable.
        #[arg(long = "registry")]
        registries: Vec<Address>,
        /// Overwrite an existing state file.
        #[arg(long)]
        force: bool,
    },

    /// Mint an asset.
    Mint {
        /// Registry address.
        #[arg(long)]
        registry: Address,
        /// Asset id.
        #[arg(long)]
        asset: AssetId,
        /// Initial holder.
        #[arg(long)]
        to: Address,
    },

    /// Approve the escrow to move one asset on behalf of its holder.
    Approve {
        /// Registry address.
        #[arg(long)]
        registry: Address,
        /// Asset id.
        #[arg(long)]
        asset: AssetId,
        /// Current holder granting the approval.
        #[arg(long)]
        holder: Address,
    },

    /// Open a duel (locks the asset in escrow).
    Create {
        /// Player 1.
        #[arg(long)]
        caller: Address,
        /// Asset as `<registry>:<id>`.
        #[arg(long)]
        asset: AssetRef,
    },

    /// Join a pending duel (locks the asset in escrow).
    Join {
        /// Player 2.
        #[arg(long)]
        caller: Address,
        /// Asset as `<registry>:<id>`.
        #[arg(long)]
        asset: AssetRef,
        /// Duel id (`7` or `duel:7`).
        #[arg(long)]
        duel: DuelId,
    },

    /// Cancel a pending duel and return player 1's asset.
    Withdraw {
        /// Player 1.
        #[arg(long)]
        caller: Address,
        /// Duel id.
        #[arg(long)]
        duel: DuelId,
    },

    /// Resolve an ongoing duel.
    Resolve {
        /// Either participant.
        #[arg(long)]
        caller: Address,
        /// Duel id.
        #[arg(long)]
        duel: DuelId,
        /// Pin the block seed (hashed to 32 bytes) instead of using the clock.
        #[arg(long)]
        seed: Option<String>,
        /// Pin the block timestamp. Only used together with `--seed`.
        #[arg(long, requires = "seed")]
        timestamp: Option<u64>,
    },

    /// Collect an asset the escrow holds for the caller after a refused
    /// return.
    Claim {
        /// The payout recipient.
        #[arg(long)]
        caller: Address,
        /// Asset as `<registry>:<id>`.
        #[arg(long)]
        asset: AssetRef,
    },

    /// Print live duels, or a single duel.
    Show {
        /// Only this duel.
        #[arg(long)]
        duel: Option<DuelId>,
    },

    /// Print the event log.
    Events {
        /// Only events for this duel.
        #[arg(long)]
        duel: Option<DuelId>,
        /// One JSON record per line.
        #[arg(long)]
        json: bool,
    },
}

/// Execute a subcommand against the state file at `state_path`.
pub fn run_command(command: &DuelCommand, state_path: &Path, config_path: Option<&Path>) -> Result<u8> {
    match command {
        DuelCommand::Init { registries, force } => {
            cmd_init(state_path, config_path, registries, *force)
        }
        DuelCommand::Mint {
            registry,
            asset,
            to,
        } => cmd_mint(state_path, registry, *asset, to),
        DuelCommand::Approve {
            registry,
            asset,
            holder,
        } => cmd_approve(state_path, registry, *asset, holder),
        DuelCommand::Create { caller, asset } => cmd_create(state_path, caller, *asset),
        DuelCommand::Join {
            caller,
            asset,
            duel,
        } => cmd_join(state_path, caller, *asset, *duel),
        DuelCommand::Withdraw { caller, duel } => cmd_withdraw(state_path, caller, *duel),
        DuelCommand::Resolve {
            caller,
            duel,
            seed,
            timestamp,
        } => cmd_resolve(state_path, caller, *duel, seed.as_deref(), *timestamp),
        DuelCommand::Claim { caller, asset } => cmd_claim(state_path, caller, *asset),
        DuelCommand::Show { duel } => cmd_show(state_path, *duel),
        DuelCommand::Events { duel, json } => cmd_events(state_path, *duel, *json),
    }
}

/// Escrow configuration for `init`: the YAML file if given, otherwise the
/// environment.
pub fn load_config(config_path: Option<&Path>) -> Result<EscrowConfig> {
    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: EscrowConfig = serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            config.validate().context("invalid escrow configuration")?;
            config
        }
        None => EscrowConfig::from_env().context("invalid escrow configuration")?,
    };
    Ok(config)
}

fn cmd_init(
    state_path: &Path,
    config_path: Option<&Path>,
    registries: &[Address],
    force: bool,
) -> Result<u8> {
    if state_path.exists() && !force {
        bail!(
            "state file already exists: {} (use --force to overwrite)",
            state_path.display()
        );
    }
    let config = load_config(config_path)?;
    let mut addresses = registries.to_vec();
    addresses.sort();
    addresses.dedup();
    for address in &addresses {
        if *address == config.escrow_address || *address == config.burn_sink {
            bail!("registry address {address} collides with the escrow or burn sink");
        }
    }

    let genesis = sha256_raw(
        format!("{}|{}", config.escrow_address, chrono::Utc::now().to_rfc3339()).as_bytes(),
    );
    let state = StateFile {
        config,
        clock: ClockState { genesis, height: 0 },
        registries: addresses
            .iter()
            .map(|address| RegistrySnapshot {
                address: *address,
                ..RegistrySnapshot::default()
            })
            .collect(),
        ..StateFile::default()
    };
    state.save(state_path)?;

    tracing::info!(path = %state_path.display(), registries = addresses.len(), "state file initialized");
    println!("OK: escrow {} initialized", config.escrow_address);
    println!("  Burn sink: {}", config.burn_sink);
    println!("  Self-duel: {:?}", config.self_duel);
    for address in &addresses {
        println!("  Registry: {address}");
    }
    Ok(0)
}

fn cmd_mint(state_path: &Path, registry: &Address, asset: AssetId, to: &Address) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    session
        .registry(registry)?
        .mint(asset, *to)
        .with_context(|| format!("failed to mint asset {asset}"))?;
    session.save()?;
    println!("OK: minted {} to {to}", AssetRef::new(*registry, asset));
    Ok(0)
}

fn cmd_approve(state_path: &Path, registry: &Address, asset: AssetId, holder: &Address) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    let escrow = session.escrow.address();
    session
        .registry(registry)?
        .approve(holder, asset, escrow)
        .with_context(|| format!("failed to approve asset {asset}"))?;
    session.save()?;
    println!(
        "OK: escrow {escrow} approved for {}",
        AssetRef::new(*registry, asset)
    );
    Ok(0)
}

fn cmd_create(state_path: &Path, caller: &Address, asset: AssetRef) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    let duel_id = session.escrow.create(caller, asset)?;
    session.save()?;
    println!("OK: created {duel_id} with {asset}");
    Ok(0)
}

fn cmd_join(state_path: &Path, caller: &Address, asset: AssetRef, duel_id: DuelId) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    session.escrow.join(caller, asset, duel_id)?;
    session.save()?;
    println!("OK: {caller} joined {duel_id} with {asset}");
    Ok(0)
}

fn cmd_withdraw(state_path: &Path, caller: &Address, duel_id: DuelId) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    session.escrow.withdraw(caller, duel_id)?;
    session.save()?;
    println!("OK: {duel_id} withdrawn");
    Ok(0)
}

fn cmd_resolve(
    state_path: &Path,
    caller: &Address,
    duel_id: DuelId,
    seed: Option<&str>,
    timestamp: Option<u64>,
) -> Result<u8> {
    let entropy: Option<Arc<dyn EntropySource>> = seed.map(|seed| {
        Arc::new(FixedEntropy::new(
            sha256_raw(seed.as_bytes()),
            timestamp.unwrap_or(0),
        )) as Arc<dyn EntropySource>
    });
    let session = Session::open(state_path, entropy)?;
    let resolution = session.escrow.resolve(caller, duel_id)?;
    session.save()?;

    println!("OK: {duel_id} resolved");
    println!("  Winner: {} (keeps {})", resolution.winner, resolution.winner_asset);
    println!("  Loser: {} (burned {})", resolution.loser, resolution.loser_asset);
    if !resolution.winner_asset_returned {
        println!(
            "  Return refused: {} held for {} (run `duel claim`)",
            resolution.winner_asset, resolution.winner
        );
    }
    Ok(0)
}

fn cmd_claim(state_path: &Path, caller: &Address, asset: AssetRef) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    session.escrow.claim_payout(caller, asset)?;
    session.save()?;
    println!("OK: {asset} delivered to {caller}");
    Ok(0)
}

fn cmd_show(state_path: &Path, duel_id: Option<DuelId>) -> Result<u8> {
    let session = Session::open(state_path, None)?;
    let duels = match duel_id {
        Some(id) => vec![session.escrow.duel(id)?],
        None => session.escrow.duels(),
    };

    println!("Escrow: {}", session.escrow.address());
    println!("  Next duel: {}", session.escrow.next_duel_id());
    if duels.is_empty() {
        println!("No live duels.");
    }
    for duel in &duels {
        println!("{}: {}", duel.id, duel.status());
        println!("  Player 1: {} ({})", duel.player1, duel.asset1);
        if let Some(challenger) = duel.challenger {
            println!("  Player 2: {} ({})", challenger.player, challenger.asset);
        }
    }
    for payout in session.escrow.payouts() {
        println!("Payout held: {} for {}", payout.asset, payout.recipient);
    }
    Ok(0)
}

fn cmd_events(state_path: &Path, duel_id: Option<DuelId>, json: bool) -> Result<u8> {
    let state = StateFile::load(state_path)?;
    let records = state
        .events
        .iter()
        .filter(|r| duel_id.map_or(true, |id| r.event.duel_id() == id));

    let mut count = 0;
    for record in records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!(
                "[{}] {} {} {}",
                record.sequence,
                record.emitted_at.to_rfc3339(),
                record.event.name(),
                record.event.duel_id()
            );
        }
        count += 1;
    }
    if count == 0 && !json {
        println!("No events.");
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_escrow::DuelStatus;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";
    const REGISTRY: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn asset(id: u64) -> AssetRef {
        AssetRef::new(addr(REGISTRY), AssetId(id))
    }

    fn init(path: &Path) {
        cmd_init(path, None, &[addr(REGISTRY)], false).unwrap();
    }

    fn fund(path: &Path, holder: &str, id: u64) {
        cmd_mint(path, &addr(REGISTRY), AssetId(id), &addr(holder)).unwrap();
        cmd_approve(path, &addr(REGISTRY), AssetId(id), &addr(holder)).unwrap();
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        let err = cmd_init(&path, None, &[], false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(cmd_init(&path, None, &[], true).is_ok());
    }

    #[test]
    fn init_rejects_registry_at_burn_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let err = cmd_init(&path, None, &[Address::BURN_SINK], false).unwrap_err();
        assert!(err.to_string().contains("collides"));
        assert!(!path.exists());
    }

    #[test]
    fn init_reads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("escrow.yaml");
        std::fs::write(
            &config_path,
            "escrow_address: \"0x00000000000000000000000000000000000000e5\"\nself_duel: forbid\n",
        )
        .unwrap();
        let path = dir.path().join("state.json");
        cmd_init(&path, Some(&config_path), &[], false).unwrap();

        let state = StateFile::load(&path).unwrap();
        assert_eq!(
            state.config.escrow_address,
            addr("0x00000000000000000000000000000000000000e5")
        );
        assert_eq!(state.config.self_duel, duel_escrow::SelfDuelPolicy::Forbid);
    }

    #[test]
    fn full_duel_through_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        fund(&path, ALICE, 1);
        fund(&path, BOB, 2);

        assert_eq!(cmd_create(&path, &addr(ALICE), asset(1)).unwrap(), 0);
        assert_eq!(cmd_join(&path, &addr(BOB), asset(2), DuelId(0)).unwrap(), 0);
        let session = Session::open(&path, None).unwrap();
        assert_eq!(session.escrow.status(DuelId(0)), Some(DuelStatus::Ongoing));
        drop(session);

        cmd_resolve(&path, &addr(ALICE), DuelId(0), Some("block-1"), Some(1_700_000_000)).unwrap();
        let state = StateFile::load(&path).unwrap();
        assert!(state.escrow.duels.is_empty());
        assert_eq!(state.escrow.next_id, DuelId(1));
        let names: Vec<&str> = state.events.iter().map(|r| r.event.name()).collect();
        assert_eq!(
            names,
            vec![
                "AssetReceived",
                "DuelCreated",
                "AssetReceived",
                "DuelJoined",
                "DuelEnded"
            ]
        );
        let holders = &state.registries[0].holders;
        let burned = holders
            .values()
            .filter(|h| **h == Address::BURN_SINK)
            .count();
        assert_eq!(burned, 1);

        assert!(cmd_show(&path, None).is_ok());
        assert!(cmd_events(&path, Some(DuelId(0)), true).is_ok());
    }

    #[test]
    fn rejected_operation_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        fund(&path, ALICE, 1);
        cmd_create(&path, &addr(ALICE), asset(1)).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = cmd_withdraw(&path, &addr(BOB), DuelId(0)).unwrap_err();
        assert!(err.to_string().contains("not authorized"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn withdraw_then_join_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        fund(&path, ALICE, 1);
        fund(&path, BOB, 2);
        cmd_create(&path, &addr(ALICE), asset(1)).unwrap();
        cmd_withdraw(&path, &addr(ALICE), DuelId(0)).unwrap();

        let err = cmd_join(&path, &addr(BOB), asset(2), DuelId(0)).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(cmd_show(&path, Some(DuelId(0))).is_err());
    }

    #[test]
    fn unpinned_resolve_advances_saved_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        let genesis = StateFile::load(&path).unwrap().clock.genesis;
        assert_ne!(genesis, [0u8; 32]);

        for (duel, (a, b)) in [(1, 2), (3, 4)].into_iter().enumerate() {
            fund(&path, ALICE, a);
            fund(&path, BOB, b);
            cmd_create(&path, &addr(ALICE), asset(a)).unwrap();
            let duel = DuelId(duel as u64);
            cmd_join(&path, &addr(BOB), asset(b), duel).unwrap();
            cmd_resolve(&path, &addr(BOB), duel, None, None).unwrap();
        }

        let clock = StateFile::load(&path).unwrap().clock;
        assert_eq!(clock.genesis, genesis);
        assert_eq!(clock.height, 2);

        // A pinned resolve leaves the clock where it was.
        fund(&path, ALICE, 5);
        fund(&path, BOB, 6);
        cmd_create(&path, &addr(ALICE), asset(5)).unwrap();
        cmd_join(&path, &addr(BOB), asset(6), DuelId(2)).unwrap();
        cmd_resolve(&path, &addr(BOB), DuelId(2), Some("pinned"), None).unwrap();
        assert_eq!(StateFile::load(&path).unwrap().clock.height, 2);
    }

    #[test]
    fn claim_without_payout_fails_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        fund(&path, ALICE, 1);
        let before = std::fs::read_to_string(&path).unwrap();

        let err = cmd_claim(&path, &addr(ALICE), asset(1)).unwrap_err();
        assert!(err.to_string().contains("no payout"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn mint_into_unknown_registry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        init(&path);
        let err = cmd_mint(&path, &addr(BOB), AssetId(1), &addr(ALICE)).unwrap_err();
        assert!(err.to_string().contains("no registry"));
    }
}
