//! # duel-escrow - Two-Party Asset-Wagering Escrow
//!
//! Two participants each lock one non-fungible asset. A resolution step picks
//! one loser pseudo-randomly; the winner's asset goes back to its owner and
//! the loser's asset is sent to the burn sink.
//!
//! - **Duel** ([`duel`]): the duel record and its closed status enum.
//!
//! - **Escrow** ([`escrow`]): [`DuelEscrow`], the table of live duels and the
//!   four transitions `create`, `withdraw`, `join`, `resolve`. An asset whose
//!   delivery is refused after a burn is held as a [`Payout`] until its
//!   recipient claims it.
//!
//! - **Registry** ([`registry`], [`memory`]): the [`AssetRegistry`] seam the
//!   escrow calls for approval queries and transfers, plus an in-memory
//!   implementation.
//!
//! - **Entropy** ([`entropy`]): the low-assurance fairness source used by
//!   `resolve`. Injectable so tests can pin it.
//!
//! - **Events** ([`events`]): the events each transition publishes after it
//!   commits.
//!
//! - **Config** ([`config`]): escrow identity, burn sink, self-duel policy.
//!
//! ## State Machine
//!
//! ```text
//!         create            join              resolve
//!  ∅ ───────────────▶ Pending ───────────────▶ Ongoing ───────────────▶ ∅
//!            │
//!            └───────────────▶ ∅   (withdraw, Pending only)
//! ```
//!
//! `∅` is terminal: a destroyed duel id is never revived or reused.

pub mod config;
pub mod duel;
pub mod entropy;
pub mod error;
pub mod escrow;
pub mod events;
pub mod memory;
pub mod registry;

pub use config::{ConfigError, EscrowConfig, SelfDuelPolicy};
pub use duel::{Challenger, Duel, DuelStatus, Side};
pub use entropy::{
    select_loser, BlockEntropy, ClockEntropy, ClockState, EntropySource, FixedEntropy,
};
pub use error::EscrowError;
pub use escrow::{DuelEscrow, DuelEscrowBuilder, EscrowSnapshot, Payout, Resolution};
pub use events::{EscrowEvent, EventLog, EventRecord, EventSink, TracingEventSink};
pub use memory::{InMemoryAssetRegistry, RegistrySnapshot, TransferHook, TransferRecord};
pub use registry::{AssetRegistry, RegistryDirectory, RegistryError};
