//! # Resolution Entropy
//!
//! `resolve` derives one pseudo-random bit from
//! `SHA-256(player1 ‖ player2 ‖ block_seed ‖ timestamp)`: an even digest
//! means player 1 loses, an odd digest means player 2 loses.
//!
//! ## Low-Assurance Fairness Source
//!
//! This is **not** secure randomness. Both inputs of [`BlockEntropy`] are
//! known to, and can be steered by, whoever produces or orders blocks, and a
//! participant can choose when to call `resolve`. The weakness is kept on
//! purpose and kept visible: entropy is injected through [`EntropySource`]
//! rather than hidden behind a stronger-looking primitive, and the one
//! shipped "live" source, [`ClockEntropy`], is a simulated block clock.
//!
//! Given equal inputs [`select_loser`] always returns the same side, which
//! lets tests replay resolutions with [`FixedEntropy`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use duel_core::{Address, ContentDigest, Sha256Accumulator};

use crate::duel::Side;

/// Per-block values mixed into the resolution hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockEntropy {
    /// Per-block unpredictability (a block hash or beacon output).
    pub block_seed: [u8; 32],
    /// Coarse wall-clock seconds of the executing block.
    pub timestamp: u64,
}

/// A source of [`BlockEntropy`], sampled once per `resolve`.
pub trait EntropySource: Send + Sync {
    /// Sample the current block's entropy.
    fn sample(&self) -> BlockEntropy;
}

/// Always returns the same entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedEntropy(pub BlockEntropy);

impl FixedEntropy {
    /// Fixed entropy from a seed and timestamp.
    pub fn new(block_seed: [u8; 32], timestamp: u64) -> Self {
        Self(BlockEntropy {
            block_seed,
            timestamp,
        })
    }
}

impl EntropySource for FixedEntropy {
    fn sample(&self) -> BlockEntropy {
        self.0
    }
}

/// Position of a [`ClockEntropy`], saved between runs so a restarted clock
/// continues at the next height instead of replaying block zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    /// Chain-specific seed fixed when the clock is first started.
    pub genesis: [u8; 32],
    /// Height of the next block to be sampled.
    pub height: u64,
}

/// Simulated block clock: each sample is a new "block" whose seed hashes a
/// genesis value, the block height, and the wall-clock second.
#[derive(Debug)]
pub struct ClockEntropy {
    genesis: [u8; 32],
    height: AtomicU64,
}

impl ClockEntropy {
    /// Start at height zero with the given genesis seed.
    pub fn new(genesis: [u8; 32]) -> Self {
        Self::resume(ClockState { genesis, height: 0 })
    }

    /// Continue from a saved position.
    pub fn resume(state: ClockState) -> Self {
        Self {
            genesis: state.genesis,
            height: AtomicU64::new(state.height),
        }
    }

    /// Current simulated block height (samples taken so far).
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    /// The position to save and later [`resume`](Self::resume) from.
    pub fn state(&self) -> ClockState {
        ClockState {
            genesis: self.genesis,
            height: self.height(),
        }
    }
}

impl Default for ClockEntropy {
    fn default() -> Self {
        Self::new([0u8; 32])
    }
}

impl EntropySource for ClockEntropy {
    fn sample(&self) -> BlockEntropy {
        let height = self.height.fetch_add(1, Ordering::SeqCst);
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let block_seed = Sha256Accumulator::new()
            .bytes(&self.genesis)
            .u64(height)
            .u64(timestamp)
            .finish()
            .bytes;
        BlockEntropy {
            block_seed,
            timestamp,
        }
    }
}

/// The resolution digest for a pair of players under `entropy`.
pub fn resolution_digest(player1: &Address, player2: &Address, entropy: &BlockEntropy) -> ContentDigest {
    Sha256Accumulator::new()
        .address(player1)
        .address(player2)
        .bytes(&entropy.block_seed)
        .u64(entropy.timestamp)
        .finish()
}

/// Which side loses. Even digest: player 1. Odd digest: player 2.
pub fn select_loser(player1: &Address, player2: &Address, entropy: &BlockEntropy) -> Side {
    if resolution_digest(player1, player2, entropy).is_odd() {
        Side::Player2
    } else {
        Side::Player1
    }
}
