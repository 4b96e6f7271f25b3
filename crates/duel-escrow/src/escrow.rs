//! # Duel Escrow
//!
//! [`DuelEscrow`] owns the table of live duels and the id counter, both
//! behind one `parking_lot::Mutex`. The four transitions follow the same
//! discipline:
//!
//! 1. Validate under the table lock.
//! 2. Advance or retire the record, then release the lock.
//! 3. Call the asset registry (approval query, transfers).
//! 4. On failure re-take the lock and reinstate the pre-operation record.
//! 5. On success publish the operation's events.
//!
//! The lock is never held across a registry call, so a registry that calls
//! back into the escrow from `transfer` neither deadlocks it nor observes a
//! record whose custody has already left. A callback that targets a duel in
//! mid-join is refused with [`EscrowError::OperationInFlight`]; one that
//! targets a duel being withdrawn or resolved finds it absent.
//!
//! `create` is the exception to step 2: it pulls the asset first and only
//! then allocates the id, so nothing about the new duel is observable until
//! the transfer has succeeded.
//!
//! `resolve` burns before it returns. A burn cannot be undone, so a refused
//! return after it ends the duel anyway and leaves the winner's asset as a
//! [`Payout`] that [`DuelEscrow::claim_payout`] delivers later.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use duel_core::{Address, AssetRef, DuelId};

use crate::config::{EscrowConfig, SelfDuelPolicy};
use crate::duel::{Challenger, Duel, DuelStatus, Side};
use crate::entropy::{select_loser, ClockEntropy, EntropySource};
use crate::error::EscrowError;
use crate::events::{EscrowEvent, EventRecord, EventSink};
use crate::registry::{AssetRegistry, RegistryDirectory};

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Serializable escrow state: the duel table, the id counter, and any
/// payouts still owed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSnapshot {
    /// The next id `create` will allocate.
    pub next_id: DuelId,
    /// Live duels, sorted by id.
    pub duels: Vec<Duel>,
    /// Assets the escrow holds on behalf of a recipient whose delivery was
    /// refused.
    #[serde(default)]
    pub payouts: Vec<Payout>,
    /// Sequence number of the next published event.
    #[serde(default)]
    pub next_sequence: u64,
}

impl EscrowSnapshot {
    fn validate(&self) -> Result<(), EscrowError> {
        let mut seen = BTreeSet::new();
        for duel in &self.duels {
            if duel.id >= self.next_id {
                return Err(EscrowError::InvalidSnapshot(format!(
                    "{} is not below next id {}",
                    duel.id, self.next_id.0
                )));
            }
            if !seen.insert(duel.id) {
                return Err(EscrowError::InvalidSnapshot(format!(
                    "{} appears more than once",
                    duel.id
                )));
            }
        }
        let escrowed: BTreeSet<AssetRef> = self
            .duels
            .iter()
            .flat_map(Duel::escrowed_assets)
            .collect();
        let mut owed = BTreeSet::new();
        for payout in &self.payouts {
            if escrowed.contains(&payout.asset) || !owed.insert(payout.asset) {
                return Err(EscrowError::InvalidSnapshot(format!(
                    "payout of {} overlaps another claim on the asset",
                    payout.asset
                )));
            }
        }
        Ok(())
    }
}

/// An asset held by the escrow for `recipient` after a transfer to them was
/// refused. Released by [`DuelEscrow::claim_payout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Who the asset belongs to.
    pub recipient: Address,
    /// The asset.
    pub asset: AssetRef,
}

/// Outcome of a successful `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The resolved duel.
    pub duel_id: DuelId,
    /// Player whose asset was returned.
    pub winner: Address,
    /// Player whose asset was sent to the burn sink.
    pub loser: Address,
    /// The winner's asset.
    pub winner_asset: AssetRef,
    /// The burned asset.
    pub loser_asset: AssetRef,
    /// `false` when the registry refused the return after the burn; the
    /// asset is then held as a [`Payout`] for the winner.
    pub winner_asset_returned: bool,
}

// ─── Table ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DuelTable {
    next_id: DuelId,
    duels: BTreeMap<DuelId, Duel>,
    /// Duels with a join between reservation and commit, keyed to the
    /// challenger that will be recorded on commit.
    in_flight: BTreeMap<DuelId, Challenger>,
    payouts: Vec<Payout>,
}

impl DuelTable {
    fn live(&self, duel_id: DuelId) -> Result<&Duel, EscrowError> {
        let duel = self
            .duels
            .get(&duel_id)
            .ok_or(EscrowError::NotFound { duel_id })?;
        if self.in_flight.contains_key(&duel_id) {
            return Err(EscrowError::OperationInFlight { duel_id });
        }
        Ok(duel)
    }

    fn allocate(&mut self) -> Option<DuelId> {
        let id = self.next_id;
        self.next_id = id.next()?;
        Some(id)
    }
}

fn require_status(
    duel: &Duel,
    operation: &'static str,
    expected: DuelStatus,
) -> Result<(), EscrowError> {
    let status = duel.status();
    if status != expected {
        return Err(EscrowError::InvalidState {
            duel_id: duel.id,
            operation,
            status,
        });
    }
    Ok(())
}

// ─── Builder ────────────────────────────────────────────────────────────────

/// Assembles a [`DuelEscrow`].
pub struct DuelEscrowBuilder {
    config: EscrowConfig,
    registries: RegistryDirectory,
    entropy: Option<Arc<dyn EntropySource>>,
    sinks: Vec<Arc<dyn EventSink>>,
    snapshot: Option<EscrowSnapshot>,
}

impl DuelEscrowBuilder {
    /// Make a registry available to the escrow.
    pub fn registry(mut self, registry: Arc<dyn AssetRegistry>) -> Self {
        self.registries.register(registry);
        self
    }

    /// Entropy source for `resolve`. Defaults to [`ClockEntropy`].
    pub fn entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = Some(entropy);
        self
    }

    /// Add an event sink. Events go to every sink in registration order.
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Start from previously saved state instead of an empty table.
    pub fn restore(mut self, snapshot: EscrowSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Validate the configuration and snapshot, then build.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Config`] or [`EscrowError::InvalidSnapshot`].
    pub fn build(self) -> Result<DuelEscrow, EscrowError> {
        self.config.validate()?;
        let snapshot = self.snapshot.unwrap_or_default();
        snapshot.validate()?;

        let table = DuelTable {
            next_id: snapshot.next_id,
            duels: snapshot.duels.into_iter().map(|d| (d.id, d)).collect(),
            in_flight: BTreeMap::new(),
            payouts: snapshot.payouts,
        };
        tracing::debug!(
            escrow = %self.config.escrow_address,
            registries = self.registries.len(),
            live_duels = table.duels.len(),
            next_id = table.next_id.0,
            "duel escrow built"
        );

        Ok(DuelEscrow {
            config: self.config,
            registries: self.registries,
            entropy: self
                .entropy
                .unwrap_or_else(|| Arc::new(ClockEntropy::default())),
            sinks: self.sinks,
            table: Mutex::new(table),
            sequence: AtomicU64::new(snapshot.next_sequence),
        })
    }
}

// ─── Escrow ─────────────────────────────────────────────────────────────────

/// The duel escrow.
pub struct DuelEscrow {
    config: EscrowConfig,
    registries: RegistryDirectory,
    entropy: Arc<dyn EntropySource>,
    sinks: Vec<Arc<dyn EventSink>>,
    table: Mutex<DuelTable>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for DuelEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelEscrow")
            .field("config", &self.config)
            .field("registries", &self.registries)
            .field("sinks", &self.sinks.len())
            .field("table", &*self.table.lock())
            .finish()
    }
}

impl DuelEscrow {
    /// Start building an escrow with `config`.
    pub fn builder(config: EscrowConfig) -> DuelEscrowBuilder {
        DuelEscrowBuilder {
            config,
            registries: RegistryDirectory::new(),
            entropy: None,
            sinks: Vec::new(),
            snapshot: None,
        }
    }

    /// The escrow's configuration.
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// The address that holds escrowed assets.
    pub fn address(&self) -> Address {
        self.config.escrow_address
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Open a duel by locking `asset` in escrow. Returns the new duel id.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::UnknownRegistry`] if `asset.registry` is not known.
    /// - [`EscrowError::NotApproved`] if the escrow is not approved to move
    ///   `asset`.
    /// - [`EscrowError::TransferRejected`] if the registry refuses the pull.
    /// - [`EscrowError::IdExhausted`] if no id remains; the asset is returned.
    pub fn create(&self, caller: &Address, asset: AssetRef) -> Result<DuelId, EscrowError> {
        let registry = self.registry_for(&asset)?;
        self.require_approval(registry.as_ref(), asset, caller)?;
        self.move_asset(registry.as_ref(), asset, caller, &self.config.escrow_address)?;

        let allocated = {
            let mut table = self.table.lock();
            table.allocate().map(|id| {
                table.duels.insert(id, Duel::open(id, *caller, asset));
                id
            })
        };
        let Some(duel_id) = allocated else {
            tracing::warn!(caller = %caller, asset = %asset, "duel id space exhausted, refunding asset");
            if self
                .move_asset(registry.as_ref(), asset, &self.config.escrow_address, caller)
                .is_err()
            {
                self.hold_payout(Payout {
                    recipient: *caller,
                    asset,
                });
            }
            return Err(EscrowError::IdExhausted);
        };

        tracing::info!(duel_id = %duel_id, player1 = %caller, asset = %asset, "duel created");
        self.publish(vec![
            EscrowEvent::AssetReceived {
                duel_id,
                registry: asset.registry,
                asset_id: asset.asset_id,
            },
            EscrowEvent::DuelCreated {
                duel_id,
                player1: *caller,
            },
        ]);
        Ok(duel_id)
    }

    /// Cancel a pending duel and return player 1's asset.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`], [`EscrowError::OperationInFlight`],
    /// [`EscrowError::Unauthorized`] unless `caller` is player 1,
    /// [`EscrowError::InvalidState`] unless pending, or
    /// [`EscrowError::TransferRejected`] (the duel is reinstated).
    pub fn withdraw(&self, caller: &Address, duel_id: DuelId) -> Result<(), EscrowError> {
        let duel = {
            let mut table = self.table.lock();
            let duel = table.live(duel_id)?;
            if duel.player1 != *caller {
                tracing::debug!(duel_id = %duel_id, caller = %caller, "withdraw refused: not player 1");
                return Err(EscrowError::Unauthorized {
                    duel_id,
                    operation: "withdraw",
                    caller: *caller,
                });
            }
            require_status(duel, "withdraw", DuelStatus::Pending)?;
            table
                .duels
                .remove(&duel_id)
                .ok_or(EscrowError::NotFound { duel_id })?
        };

        let outcome = self
            .registry_for(&duel.asset1)
            .and_then(|registry| {
                self.move_asset(
                    registry.as_ref(),
                    duel.asset1,
                    &self.config.escrow_address,
                    &duel.player1,
                )
            });
        if let Err(e) = outcome {
            self.reinstate(duel);
            return Err(e);
        }

        tracing::info!(duel_id = %duel_id, player1 = %caller, "duel withdrawn");
        self.publish(vec![EscrowEvent::DuelWithdrawn {
            duel_id,
            player1: *caller,
        }]);
        Ok(())
    }

    /// Join a pending duel by locking `asset` in escrow.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`], [`EscrowError::OperationInFlight`],
    /// [`EscrowError::InvalidState`] unless pending,
    /// [`EscrowError::SelfDuelForbidden`] under [`SelfDuelPolicy::Forbid`],
    /// [`EscrowError::UnknownRegistry`], [`EscrowError::NotApproved`], or
    /// [`EscrowError::TransferRejected`].
    pub fn join(&self, caller: &Address, asset: AssetRef, duel_id: DuelId) -> Result<(), EscrowError> {
        {
            let mut table = self.table.lock();
            let duel = table.live(duel_id)?;
            require_status(duel, "join", DuelStatus::Pending)?;
            if self.config.self_duel == SelfDuelPolicy::Forbid && duel.player1 == *caller {
                return Err(EscrowError::SelfDuelForbidden {
                    duel_id,
                    player: *caller,
                });
            }
            table.in_flight.insert(
                duel_id,
                Challenger {
                    player: *caller,
                    asset,
                },
            );
        }

        let pulled = self.registry_for(&asset).and_then(|registry| {
            self.require_approval(registry.as_ref(), asset, caller)?;
            self.move_asset(registry.as_ref(), asset, caller, &self.config.escrow_address)
        });

        let committed = {
            let mut table = self.table.lock();
            let reserved = table.in_flight.remove(&duel_id);
            if let Err(e) = pulled {
                tracing::debug!(duel_id = %duel_id, caller = %caller, error = %e, "join rolled back");
                return Err(e);
            }
            match table.duels.get_mut(&duel_id) {
                Some(duel) => {
                    duel.challenger = reserved;
                    true
                }
                None => false,
            }
        };
        if !committed {
            // Records are only removed by withdraw/resolve, both of which
            // refuse in-flight duels.
            tracing::error!(duel_id = %duel_id, "joined duel vanished while in flight");
            self.hold_payout(Payout {
                recipient: *caller,
                asset,
            });
            return Err(EscrowError::NotFound { duel_id });
        }

        tracing::info!(duel_id = %duel_id, player2 = %caller, asset = %asset, "duel joined");
        self.publish(vec![
            EscrowEvent::AssetReceived {
                duel_id,
                registry: asset.registry,
                asset_id: asset.asset_id,
            },
            EscrowEvent::DuelJoined {
                duel_id,
                player2: *caller,
            },
        ]);
        Ok(())
    }

    /// Resolve an ongoing duel: pick a loser, send the loser's asset to the
    /// burn sink, and return the winner's asset.
    ///
    /// The burn happens first. Once it succeeds the duel has ended; if the
    /// registry then refuses the return, the winner's asset is held as a
    /// [`Payout`] and [`Resolution::winner_asset_returned`] is `false`.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`], [`EscrowError::OperationInFlight`],
    /// [`EscrowError::InvalidState`] unless ongoing,
    /// [`EscrowError::Unauthorized`] unless `caller` is a participant,
    /// [`EscrowError::UnknownRegistry`], [`EscrowError::CustodyMismatch`],
    /// or [`EscrowError::TransferRejected`] for the burn. In each case
    /// nothing has moved and the duel is left ongoing.
    pub fn resolve(&self, caller: &Address, duel_id: DuelId) -> Result<Resolution, EscrowError> {
        let duel = {
            let mut table = self.table.lock();
            let duel = table.live(duel_id)?;
            require_status(duel, "resolve", DuelStatus::Ongoing)?;
            if !duel.is_participant(caller) {
                tracing::debug!(duel_id = %duel_id, caller = %caller, "resolve refused: not a participant");
                return Err(EscrowError::Unauthorized {
                    duel_id,
                    operation: "resolve",
                    caller: *caller,
                });
            }
            table
                .duels
                .remove(&duel_id)
                .ok_or(EscrowError::NotFound { duel_id })?
        };

        match self.settle(&duel) {
            Ok(resolution) => {
                tracing::info!(
                    duel_id = %duel_id,
                    winner = %resolution.winner,
                    loser = %resolution.loser,
                    returned = resolution.winner_asset_returned,
                    "duel resolved"
                );
                self.publish(vec![EscrowEvent::DuelEnded {
                    duel_id,
                    winner: resolution.winner,
                    loser: resolution.loser,
                }]);
                Ok(resolution)
            }
            Err(e) => {
                self.reinstate(duel);
                Err(e)
            }
        }
    }

    fn settle(&self, duel: &Duel) -> Result<Resolution, EscrowError> {
        let (Some((player1, asset1)), Some((player2, asset2))) =
            (duel.side(Side::Player1), duel.side(Side::Player2))
        else {
            return Err(EscrowError::InvalidState {
                duel_id: duel.id,
                operation: "resolve",
                status: duel.status(),
            });
        };

        let entropy = self.entropy.sample();
        let loser_side = select_loser(&player1, &player2, &entropy);
        let pick = |side: Side| match side {
            Side::Player1 => (player1, asset1),
            Side::Player2 => (player2, asset2),
        };
        let (loser, loser_asset) = pick(loser_side);
        let (winner, winner_asset) = pick(loser_side.opponent());
        tracing::debug!(
            duel_id = %duel.id,
            timestamp = entropy.timestamp,
            loser = ?loser_side,
            "resolution drawn"
        );

        let winner_registry = self.registry_for(&winner_asset)?;
        let loser_registry = self.registry_for(&loser_asset)?;
        self.require_custody(winner_registry.as_ref(), winner_asset)?;
        self.require_custody(loser_registry.as_ref(), loser_asset)?;

        let escrow = self.config.escrow_address;
        self.move_asset(
            loser_registry.as_ref(),
            loser_asset,
            &escrow,
            &self.config.burn_sink,
        )?;

        let winner_asset_returned =
            match self.move_asset(winner_registry.as_ref(), winner_asset, &escrow, &winner) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        duel_id = %duel.id,
                        asset = %winner_asset,
                        winner = %winner,
                        error = %e,
                        "return refused after burn; holding payout for winner"
                    );
                    self.hold_payout(Payout {
                        recipient: winner,
                        asset: winner_asset,
                    });
                    false
                }
            };

        Ok(Resolution {
            duel_id: duel.id,
            winner,
            loser,
            winner_asset,
            loser_asset,
            winner_asset_returned,
        })
    }

    /// Deliver a held [`Payout`] of `asset` to `caller`, its recipient.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NoPayout`] unless `asset` is held for `caller`,
    /// [`EscrowError::UnknownRegistry`], or
    /// [`EscrowError::TransferRejected`] (the payout stays held).
    pub fn claim_payout(&self, caller: &Address, asset: AssetRef) -> Result<(), EscrowError> {
        let payout = {
            let mut table = self.table.lock();
            let index = table
                .payouts
                .iter()
                .position(|p| p.asset == asset && p.recipient == *caller)
                .ok_or(EscrowError::NoPayout {
                    asset,
                    caller: *caller,
                })?;
            table.payouts.remove(index)
        };

        let outcome = self.registry_for(&asset).and_then(|registry| {
            self.move_asset(registry.as_ref(), asset, &self.config.escrow_address, caller)
        });
        if let Err(e) = outcome {
            self.hold_payout(payout);
            return Err(e);
        }

        tracing::info!(recipient = %caller, asset = %asset, "payout claimed");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// A live duel.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`] if the id was never issued or the duel has
    /// ended.
    pub fn duel(&self, duel_id: DuelId) -> Result<Duel, EscrowError> {
        self.table
            .lock()
            .duels
            .get(&duel_id)
            .cloned()
            .ok_or(EscrowError::NotFound { duel_id })
    }

    /// Status of a live duel, `None` if absent.
    pub fn status(&self, duel_id: DuelId) -> Option<DuelStatus> {
        self.table.lock().duels.get(&duel_id).map(Duel::status)
    }

    /// All live duels, sorted by id.
    pub fn duels(&self) -> Vec<Duel> {
        self.table.lock().duels.values().cloned().collect()
    }

    /// Pending duels not currently being joined, sorted by id.
    pub fn open_duels(&self) -> Vec<Duel> {
        let table = self.table.lock();
        table
            .duels
            .values()
            .filter(|d| d.status() == DuelStatus::Pending && !table.in_flight.contains_key(&d.id))
            .cloned()
            .collect()
    }

    /// The id the next successful `create` will receive.
    pub fn next_duel_id(&self) -> DuelId {
        self.table.lock().next_id
    }

    /// Payouts held for recipients whose delivery was refused.
    pub fn payouts(&self) -> Vec<Payout> {
        self.table.lock().payouts.clone()
    }

    /// Copy of the committed state. In-flight joins are not included.
    pub fn snapshot(&self) -> EscrowSnapshot {
        let table = self.table.lock();
        EscrowSnapshot {
            next_id: table.next_id,
            duels: table.duels.values().cloned().collect(),
            payouts: table.payouts.clone(),
            next_sequence: self.sequence.load(Ordering::SeqCst),
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn registry_for(&self, asset: &AssetRef) -> Result<Arc<dyn AssetRegistry>, EscrowError> {
        self.registries
            .get(&asset.registry)
            .ok_or(EscrowError::UnknownRegistry(asset.registry))
    }

    fn require_approval(
        &self,
        registry: &dyn AssetRegistry,
        asset: AssetRef,
        caller: &Address,
    ) -> Result<(), EscrowError> {
        if registry.is_approved_for_transfer(asset.asset_id, &self.config.escrow_address) {
            return Ok(());
        }
        tracing::debug!(asset = %asset, caller = %caller, "escrow not approved");
        Err(EscrowError::NotApproved {
            asset,
            caller: *caller,
            escrow: self.config.escrow_address,
        })
    }

    fn require_custody(&self, registry: &dyn AssetRegistry, asset: AssetRef) -> Result<(), EscrowError> {
        match registry.owner_of(asset.asset_id) {
            Some(holder) if holder == self.config.escrow_address => Ok(()),
            holder => {
                let holder = holder.map_or_else(|| "none".to_string(), |h| h.to_string());
                tracing::error!(asset = %asset, holder = %holder, "escrowed asset not held by escrow");
                Err(EscrowError::CustodyMismatch { asset, holder })
            }
        }
    }

    fn move_asset(
        &self,
        registry: &dyn AssetRegistry,
        asset: AssetRef,
        from: &Address,
        to: &Address,
    ) -> Result<(), EscrowError> {
        registry
            .transfer(&self.config.escrow_address, asset.asset_id, from, to)
            .map_err(|source| {
                tracing::warn!(asset = %asset, from = %from, to = %to, error = %source, "transfer rejected");
                EscrowError::TransferRejected {
                    asset,
                    from: *from,
                    to: *to,
                    source,
                }
            })
    }

    fn reinstate(&self, duel: Duel) {
        tracing::warn!(duel_id = %duel.id, status = %duel.status(), "duel reinstated after failed transfer");
        self.table.lock().duels.insert(duel.id, duel);
    }

    fn hold_payout(&self, payout: Payout) {
        self.table.lock().payouts.push(payout);
    }

    fn publish(&self, events: Vec<EscrowEvent>) {
        let count = events.len() as u64;
        let first = self.sequence.fetch_add(count, Ordering::SeqCst);
        let emitted_at = Utc::now();
        for (offset, event) in (0u64..).zip(events) {
            let record = EventRecord {
                sequence: first + offset,
                emitted_at,
                event,
            };
            for sink in &self.sinks {
                sink.publish(record.clone());
            }
        }
    }
}
