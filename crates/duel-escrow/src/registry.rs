//! # Asset Registry Seam
//!
//! The escrow never owns asset bookkeeping. It asks an [`AssetRegistry`]
//! whether it has been approved to move an asset, who holds an asset, and to
//! perform transfers. Each registry is identified by its address; the
//! [`RegistryDirectory`] maps the `registry` half of an
//! [`AssetRef`](duel_core::AssetRef) to the implementation.
//!
//! ## Reentrancy
//!
//! A registry may call back into the escrow from inside `transfer` (a hook
//! on the receiving side, or a hostile implementation). The escrow never
//! holds its table lock across any call on this trait, and it arranges its
//! own state so that such a callback sees the post-transition state.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use duel_core::{Address, AssetId};

/// Reasons a registry refuses a transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The asset does not exist in this registry.
    #[error("asset {0} does not exist")]
    UnknownAsset(AssetId),

    /// Asset already exists.
    #[error("asset {0} already minted")]
    AlreadyMinted(AssetId),

    /// `from` does not hold the asset.
    #[error("{claimed} does not hold asset {asset_id} (holder is {holder})")]
    NotOwner {
        /// The asset.
        asset_id: AssetId,
        /// The address that claimed to hold it.
        claimed: Address,
        /// The actual holder.
        holder: Address,
    },

    /// Operator is neither the holder nor approved by the holder.
    #[error("{operator} is not approved to move asset {asset_id}")]
    NotAuthorized {
        /// The asset.
        asset_id: AssetId,
        /// The rejected operator.
        operator: Address,
    },

    /// The burn sink can never send assets.
    #[error("asset {0} is held by the burn sink and cannot move")]
    BurnSinkLocked(AssetId),

    /// Implementation-specific refusal.
    #[error("{0}")]
    Rejected(String),
}

/// The interface the escrow consumes from an external asset registry.
///
/// Implementations must be safe to call concurrently and may re-enter the
/// escrow from `transfer`.
pub trait AssetRegistry: Send + Sync {
    /// This registry's address.
    fn address(&self) -> Address;

    /// Current holder of an asset, `None` if it does not exist.
    fn owner_of(&self, asset_id: AssetId) -> Option<Address>;

    /// Whether `spender` is approved to move `asset_id` on behalf of its
    /// current holder.
    fn is_approved_for_transfer(&self, asset_id: AssetId, spender: &Address) -> bool;

    /// Move `asset_id` from `from` to `to`, acting as `operator`.
    ///
    /// # Errors
    ///
    /// Fails if `from` is not the holder, `operator` is neither the holder
    /// nor approved, or the registry otherwise refuses.
    fn transfer(
        &self,
        operator: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), RegistryError>;
}

/// Address-keyed set of registries known to the escrow.
#[derive(Clone, Default)]
pub struct RegistryDirectory {
    registries: HashMap<Address, Arc<dyn AssetRegistry>>,
}

impl std::fmt::Debug for RegistryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut addresses: Vec<&Address> = self.registries.keys().collect();
        addresses.sort();
        f.debug_struct("RegistryDirectory")
            .field("registries", &addresses)
            .finish()
    }
}

impl RegistryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a registry under its own address, replacing any previous
    /// registry at that address.
    pub fn register(&mut self, registry: Arc<dyn AssetRegistry>) -> Option<Arc<dyn AssetRegistry>> {
        self.registries.insert(registry.address(), registry)
    }

    /// Look up the registry at `address`.
    pub fn get(&self, address: &Address) -> Option<Arc<dyn AssetRegistry>> {
        self.registries.get(address).cloned()
    }

    /// Number of registries.
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Whether no registries are registered.
    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}
