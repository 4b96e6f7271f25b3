//! # duel-core - Foundational Types for the Duel Escrow
//!
//! Every other crate in the workspace depends on `duel-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `Address`, `AssetId`,
//!    `DuelId` are distinct types. A registry address cannot be passed where a
//!    player address is expected without going through `AssetRef`, and a duel
//!    id is never confused with an asset id.
//!
//! 2. **Explicit burn sink.** [`Address::BURN_SINK`] is the one well-known
//!    identity that receives destroyed assets.
//!
//! 3. **SHA-256 only.** All hashing flows through [`digest`], so the
//!    resolution hash and any content digests share one implementation.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `duel-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;

pub use digest::{sha256_raw, ContentDigest, Sha256Accumulator};
pub use error::CoreError;
pub use identity::{Address, AssetId, AssetRef, DuelId};
