//! # Escrow Property Tests
//!
//! Random operation sequences from a small set of players, checking after
//! every step that:
//! - duel ids are strictly increasing and never reused,
//! - every live duel's assets are held by the escrow and the escrow holds
//!   nothing else,
//! - exactly one asset is burned per resolution,
//! - the same players and entropy always select the same loser.

mod common;

use std::collections::BTreeSet;

use common::*;
use duel_core::{Address, AssetId, DuelId};
use duel_escrow::{select_loser, AssetRegistry, BlockEntropy, EscrowConfig, FixedEntropy};
use proptest::prelude::*;

const PLAYERS: [Address; 3] = [ALICE, BOB, CAROL];

#[derive(Debug, Clone)]
enum Op {
    Create { player: usize },
    Join { player: usize, duel: u64 },
    Withdraw { player: usize, duel: u64 },
    Resolve { player: usize, duel: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    let player = 0..PLAYERS.len();
    let duel = 0u64..8;
    prop_oneof![
        player.clone().prop_map(|player| Op::Create { player }),
        (player.clone(), duel.clone()).prop_map(|(player, duel)| Op::Join { player, duel }),
        (player.clone(), duel.clone()).prop_map(|(player, duel)| Op::Withdraw { player, duel }),
        (player, duel).prop_map(|(player, duel)| Op::Resolve { player, duel }),
    ]
}

fn entropy() -> impl Strategy<Value = BlockEntropy> {
    (any::<[u8; 32]>(), any::<u64>()).prop_map(|(block_seed, timestamp)| BlockEntropy {
        block_seed,
        timestamp,
    })
}

fn check_custody(w: &World, minted: u64) -> Result<(), TestCaseError> {
    let escrow = w.escrow.address();
    let mut referenced = BTreeSet::new();
    for duel in w.escrow.duels() {
        for asset in duel.escrowed_assets() {
            prop_assert_eq!(w.registry.owner_of(asset.asset_id), Some(escrow));
            prop_assert!(referenced.insert(asset.asset_id), "asset in two duels");
        }
    }
    let held: BTreeSet<AssetId> = (1..=minted)
        .map(AssetId)
        .filter(|id| w.registry.owner_of(*id) == Some(escrow))
        .collect();
    prop_assert_eq!(held, referenced);
    Ok(())
}

proptest! {
    /// Ids, custody, and burns stay consistent over arbitrary sequences.
    #[test]
    fn random_sequences_preserve_invariants(ops in prop::collection::vec(op(), 1..40)) {
        let w = world();
        let mut minted = 0u64;
        let mut last_id: Option<DuelId> = None;
        let mut resolved = 0usize;

        for op in ops {
            match op {
                Op::Create { player } => {
                    minted += 1;
                    let a = w.fund(PLAYERS[player], minted);
                    let id = w.escrow.create(&PLAYERS[player], a).unwrap();
                    if let Some(prev) = last_id {
                        prop_assert!(id > prev);
                    }
                    prop_assert_eq!(w.escrow.next_duel_id(), DuelId(id.0 + 1));
                    last_id = Some(id);
                }
                Op::Join { player, duel } => {
                    minted += 1;
                    let a = w.fund(PLAYERS[player], minted);
                    let before = w.escrow.status(DuelId(duel));
                    let result = w.escrow.join(&PLAYERS[player], a, DuelId(duel));
                    prop_assert_eq!(
                        result.is_ok(),
                        before == Some(duel_escrow::DuelStatus::Pending)
                    );
                }
                Op::Withdraw { player, duel } => {
                    let before = w.escrow.duel(DuelId(duel)).ok();
                    let result = w.escrow.withdraw(&PLAYERS[player], DuelId(duel));
                    let allowed = before.as_ref().is_some_and(|d| {
                        d.player1 == PLAYERS[player]
                            && d.status() == duel_escrow::DuelStatus::Pending
                    });
                    prop_assert_eq!(result.is_ok(), allowed);
                    if let (Ok(()), Some(d)) = (&result, before) {
                        prop_assert_eq!(w.registry.owner_of(d.asset1.asset_id), Some(d.player1));
                    }
                }
                Op::Resolve { player, duel } => {
                    let before = w.escrow.duel(DuelId(duel)).ok();
                    let result = w.escrow.resolve(&PLAYERS[player], DuelId(duel));
                    let allowed = before.as_ref().is_some_and(|d| {
                        d.status() == duel_escrow::DuelStatus::Ongoing
                            && d.is_participant(&PLAYERS[player])
                    });
                    prop_assert_eq!(result.is_ok(), allowed);
                    if let Ok(resolution) = result {
                        resolved += 1;
                        prop_assert!(resolution.winner_asset_returned);
                        prop_assert_eq!(
                            w.registry.owner_of(resolution.winner_asset.asset_id),
                            Some(resolution.winner)
                        );
                    }
                }
            }
            check_custody(&w, minted)?;
            prop_assert_eq!(w.registry.assets_of(&Address::BURN_SINK).len(), resolved);
        }
    }

    /// The loser depends only on the players and the entropy, not on who
    /// calls resolve.
    #[test]
    fn resolution_is_deterministic(block in entropy(), caller_is_player1 in any::<bool>()) {
        let expected = select_loser(&ALICE, &BOB, &block);
        prop_assert_eq!(select_loser(&ALICE, &BOB, &block), expected);

        let w = world_with(EscrowConfig::default(), FixedEntropy(block));
        let a = w.fund(ALICE, 1);
        let b = w.fund(BOB, 2);
        let id = w.escrow.create(&ALICE, a).unwrap();
        w.escrow.join(&BOB, b, id).unwrap();
        let caller = if caller_is_player1 { ALICE } else { BOB };
        let resolution = w.escrow.resolve(&caller, id).unwrap();

        let expected_loser = match expected {
            duel_escrow::Side::Player1 => ALICE,
            duel_escrow::Side::Player2 => BOB,
        };
        prop_assert_eq!(resolution.loser, expected_loser);
    }
}
