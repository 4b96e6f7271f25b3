//! Shared fixtures: one in-memory registry, an escrow with pinned entropy,
//! and an event log.

#![allow(dead_code)]

use std::sync::Arc;

use duel_core::{Address, AssetId, AssetRef};
use duel_escrow::{
    AssetRegistry, DuelEscrow, EscrowConfig, EventLog, FixedEntropy, InMemoryAssetRegistry,
};

pub const ALICE: Address = Address::from_bytes([0x11; 20]);
pub const BOB: Address = Address::from_bytes([0x22; 20]);
pub const CAROL: Address = Address::from_bytes([0x33; 20]);
pub const REGISTRY: Address = Address::from_bytes([0xaa; 20]);

pub struct World {
    pub escrow: Arc<DuelEscrow>,
    pub registry: Arc<InMemoryAssetRegistry>,
    pub log: Arc<EventLog>,
}

pub fn pinned_entropy() -> FixedEntropy {
    FixedEntropy::new([0x5e; 32], 1_700_000_000)
}

pub fn world() -> World {
    world_with(EscrowConfig::default(), pinned_entropy())
}

pub fn world_with(config: EscrowConfig, entropy: FixedEntropy) -> World {
    let registry = Arc::new(InMemoryAssetRegistry::new(REGISTRY));
    let log = Arc::new(EventLog::new());
    let escrow = DuelEscrow::builder(config)
        .registry(registry.clone())
        .entropy(Arc::new(entropy))
        .events(log.clone())
        .build()
        .expect("escrow builds");
    World {
        escrow: Arc::new(escrow),
        registry,
        log,
    }
}

pub fn asset(id: u64) -> AssetRef {
    AssetRef::new(REGISTRY, AssetId(id))
}

impl World {
    /// Mint `id` to `holder`.
    pub fn mint(&self, holder: Address, id: u64) -> AssetRef {
        self.registry.mint(AssetId(id), holder).expect("mint");
        asset(id)
    }

    /// Mint `id` to `holder` and approve the escrow for it.
    pub fn fund(&self, holder: Address, id: u64) -> AssetRef {
        let asset = self.mint(holder, id);
        self.registry
            .approve(&holder, AssetId(id), self.escrow.address())
            .expect("approve");
        asset
    }

    pub fn holder(&self, id: u64) -> Option<Address> {
        self.registry.owner_of(AssetId(id))
    }
}
