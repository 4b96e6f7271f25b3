//! # Duel Records
//!
//! A duel is live in exactly one of two statuses:
//!
//! ```text
//! Pending ──join──▶ Ongoing
//! ```
//!
//! The status is derived from whether a challenger has joined, so a record
//! can never claim `Ongoing` without a second player and asset. A duel that
//! has been withdrawn or resolved has no record at all.

use serde::{Deserialize, Serialize};

use duel_core::{Address, AssetRef, DuelId};

/// The status of a live duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuelStatus {
    /// Created, waiting for a challenger. Only player 1 and asset 1 are set.
    Pending,
    /// Both players have locked an asset. Waiting for resolution.
    Ongoing,
}

impl DuelStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ongoing => "ONGOING",
        }
    }
}

impl std::fmt::Display for DuelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The creator.
    Player1,
    /// The challenger.
    Player2,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Self::Player1 => Self::Player2,
            Self::Player2 => Self::Player1,
        }
    }
}

/// The second participant and the asset they locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenger {
    /// Player 2.
    pub player: Address,
    /// Asset 2.
    pub asset: AssetRef,
}

/// A live duel record, owned exclusively by the escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duel {
    /// Identifier allocated at creation.
    pub id: DuelId,
    /// The creator.
    pub player1: Address,
    /// The creator's locked asset.
    pub asset1: AssetRef,
    /// Set once a second player joins.
    pub challenger: Option<Challenger>,
}

impl Duel {
    /// A freshly created, pending duel.
    pub fn open(id: DuelId, player1: Address, asset1: AssetRef) -> Self {
        Self {
            id,
            player1,
            asset1,
            challenger: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> DuelStatus {
        match self.challenger {
            None => DuelStatus::Pending,
            Some(_) => DuelStatus::Ongoing,
        }
    }

    /// Player 2, if joined.
    pub fn player2(&self) -> Option<Address> {
        self.challenger.map(|c| c.player)
    }

    /// Asset 2, if joined.
    pub fn asset2(&self) -> Option<AssetRef> {
        self.challenger.map(|c| c.asset)
    }

    /// Whether `who` is player 1 or player 2.
    pub fn is_participant(&self, who: &Address) -> bool {
        self.player1 == *who || self.player2().as_ref() == Some(who)
    }

    /// Every asset the escrow must hold while this record exists.
    pub fn escrowed_assets(&self) -> Vec<AssetRef> {
        let mut assets = vec![self.asset1];
        assets.extend(self.asset2());
        assets
    }

    /// Player and asset on the given side. `None` for player 2 while pending.
    pub fn side(&self, side: Side) -> Option<(Address, AssetRef)> {
        match side {
            Side::Player1 => Some((self.player1, self.asset1)),
            Side::Player2 => self.challenger.map(|c| (c.player, c.asset)),
        }
    }
}
