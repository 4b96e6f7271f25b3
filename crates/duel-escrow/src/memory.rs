//! # In-Memory Asset Registry
//!
//! A reference [`AssetRegistry`] for tests and the CLI. Holdings, per-asset
//! approvals, and holder-wide operator approvals live behind one
//! `parking_lot::RwLock`.
//!
//! Transfer rules:
//!
//! - `from` must be the current holder.
//! - `operator` must be the holder, the asset's approved spender, or an
//!   operator the holder approved for all assets.
//! - Nothing ever leaves [`Address::BURN_SINK`].
//! - A successful transfer clears the asset's per-asset approval.
//!
//! An optional [`TransferHook`] runs after each successful transfer with the
//! registry lock released, so it may call back into the escrow.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use duel_core::{Address, AssetId};

use crate::registry::{AssetRegistry, RegistryError};

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// The asset moved.
    pub asset_id: AssetId,
    /// Previous holder.
    pub from: Address,
    /// New holder.
    pub to: Address,
    /// Who requested the transfer.
    pub operator: Address,
}

/// Callback run after every successful transfer.
pub type TransferHook = Arc<dyn Fn(&TransferRecord) + Send + Sync>;

/// Serializable registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Registry address.
    pub address: Address,
    /// Holder of every minted asset.
    pub holders: BTreeMap<AssetId, Address>,
    /// Per-asset approved spender.
    pub approvals: BTreeMap<AssetId, Address>,
    /// `(holder, operator)` pairs approved for all of the holder's assets.
    pub operators: BTreeSet<(Address, Address)>,
    /// Transfer history, oldest first.
    pub history: Vec<TransferRecord>,
}

/// In-memory non-fungible asset registry.
pub struct InMemoryAssetRegistry {
    address: Address,
    state: RwLock<RegistrySnapshot>,
    hook: RwLock<Option<TransferHook>>,
}

impl std::fmt::Debug for InMemoryAssetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAssetRegistry")
            .field("address", &self.address)
            .field("assets", &self.state.read().holders.len())
            .field("hook", &self.hook.read().is_some())
            .finish()
    }
}

impl InMemoryAssetRegistry {
    /// An empty registry at `address`.
    pub fn new(address: Address) -> Self {
        Self::from_snapshot(RegistrySnapshot {
            address,
            ..RegistrySnapshot::default()
        })
    }

    /// Rebuild a registry from a snapshot.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            address: snapshot.address,
            state: RwLock::new(snapshot),
            hook: RwLock::new(None),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().clone()
    }

    /// Create a new asset held by `holder`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyMinted`] if the id exists.
    pub fn mint(&self, asset_id: AssetId, holder: Address) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        if state.holders.contains_key(&asset_id) {
            return Err(RegistryError::AlreadyMinted(asset_id));
        }
        state.holders.insert(asset_id, holder);
        tracing::debug!(registry = %self.address, asset_id = %asset_id, holder = %holder, "asset minted");
        Ok(())
    }

    /// Approve `spender` to move one asset. Only the holder may approve.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownAsset`] or [`RegistryError::NotOwner`].
    pub fn approve(
        &self,
        holder: &Address,
        asset_id: AssetId,
        spender: Address,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        let current = *state
            .holders
            .get(&asset_id)
            .ok_or(RegistryError::UnknownAsset(asset_id))?;
        if current != *holder {
            return Err(RegistryError::NotOwner {
                asset_id,
                claimed: *holder,
                holder: current,
            });
        }
        state.approvals.insert(asset_id, spender);
        Ok(())
    }

    /// Grant or revoke `operator` rights over all of `holder`'s assets.
    pub fn set_approval_for_all(&self, holder: Address, operator: Address, approved: bool) {
        let mut state = self.state.write();
        if approved {
            state.operators.insert((holder, operator));
        } else {
            state.operators.remove(&(holder, operator));
        }
    }

    /// Transfers so far, oldest first.
    pub fn history(&self) -> Vec<TransferRecord> {
        self.state.read().history.clone()
    }

    /// Assets currently held by `holder`.
    pub fn assets_of(&self, holder: &Address) -> Vec<AssetId> {
        self.state
            .read()
            .holders
            .iter()
            .filter(|(_, h)| *h == holder)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Install a hook run after each successful transfer.
    pub fn set_transfer_hook(&self, hook: TransferHook) {
        *self.hook.write() = Some(hook);
    }

    /// Remove the transfer hook.
    pub fn clear_transfer_hook(&self) {
        *self.hook.write() = None;
    }
}

impl AssetRegistry for InMemoryAssetRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn owner_of(&self, asset_id: AssetId) -> Option<Address> {
        self.state.read().holders.get(&asset_id).copied()
    }

    fn is_approved_for_transfer(&self, asset_id: AssetId, spender: &Address) -> bool {
        let state = self.state.read();
        let Some(holder) = state.holders.get(&asset_id) else {
            return false;
        };
        state.approvals.get(&asset_id) == Some(spender)
            || state.operators.contains(&(*holder, *spender))
    }

    fn transfer(
        &self,
        operator: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), RegistryError> {
        let record = {
            let mut state = self.state.write();
            let holder = *state
                .holders
                .get(&asset_id)
                .ok_or(RegistryError::UnknownAsset(asset_id))?;
            if holder == Address::BURN_SINK {
                return Err(RegistryError::BurnSinkLocked(asset_id));
            }
            if holder != *from {
                return Err(RegistryError::NotOwner {
                    asset_id,
                    claimed: *from,
                    holder,
                });
            }
            let authorized = *operator == holder
                || state.approvals.get(&asset_id) == Some(operator)
                || state.operators.contains(&(holder, *operator));
            if !authorized {
                return Err(RegistryError::NotAuthorized {
                    asset_id,
                    operator: *operator,
                });
            }
            state.holders.insert(asset_id, *to);
            state.approvals.remove(&asset_id);
            let record = TransferRecord {
                asset_id,
                from: *from,
                to: *to,
                operator: *operator,
            };
            state.history.push(record.clone());
            record
        };

        tracing::debug!(
            registry = %self.address,
            asset_id = %asset_id,
            from = %record.from,
            to = %record.to,
            "asset transferred"
        );

        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(&record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn registry() -> InMemoryAssetRegistry {
        InMemoryAssetRegistry::new(addr(0xaa))
    }

    #[test]
    fn mint_sets_holder() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        assert_eq!(reg.owner_of(AssetId(1)), Some(addr(1)));
        assert_eq!(reg.owner_of(AssetId(2)), None);
        assert_eq!(reg.assets_of(&addr(1)), vec![AssetId(1)]);
    }

    #[test]
    fn double_mint_rejected() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        assert_eq!(
            reg.mint(AssetId(1), addr(2)),
            Err(RegistryError::AlreadyMinted(AssetId(1)))
        );
    }

    #[test]
    fn only_holder_can_approve() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        assert!(reg.approve(&addr(2), AssetId(1), addr(9)).is_err());
        assert!(!reg.is_approved_for_transfer(AssetId(1), &addr(9)));
        reg.approve(&addr(1), AssetId(1), addr(9)).unwrap();
        assert!(reg.is_approved_for_transfer(AssetId(1), &addr(9)));
    }

    #[test]
    fn approved_operator_can_pull() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        reg.approve(&addr(1), AssetId(1), addr(9)).unwrap();
        reg.transfer(&addr(9), AssetId(1), &addr(1), &addr(9)).unwrap();
        assert_eq!(reg.owner_of(AssetId(1)), Some(addr(9)));
        // Per-asset approval is consumed by the transfer.
        assert!(!reg.is_approved_for_transfer(AssetId(1), &addr(9)));
        assert_eq!(reg.history().len(), 1);
    }

    #[test]
    fn unapproved_operator_rejected() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        let err = reg.transfer(&addr(9), AssetId(1), &addr(1), &addr(9)).unwrap_err();
        assert!(matches!(err, RegistryError::NotAuthorized { .. }));
        assert_eq!(reg.owner_of(AssetId(1)), Some(addr(1)));
    }

    #[test]
    fn wrong_source_rejected() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        let err = reg.transfer(&addr(2), AssetId(1), &addr(2), &addr(3)).unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner { .. }));
    }

    #[test]
    fn operator_for_all() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        reg.set_approval_for_all(addr(1), addr(9), true);
        assert!(reg.is_approved_for_transfer(AssetId(1), &addr(9)));
        reg.set_approval_for_all(addr(1), addr(9), false);
        assert!(!reg.is_approved_for_transfer(AssetId(1), &addr(9)));
    }

    #[test]
    fn burn_sink_cannot_send() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        reg.transfer(&addr(1), AssetId(1), &addr(1), &Address::BURN_SINK)
            .unwrap();
        let err = reg
            .transfer(
                &Address::BURN_SINK,
                AssetId(1),
                &Address::BURN_SINK,
                &addr(1),
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::BurnSinkLocked(AssetId(1)));
    }

    #[test]
    fn hook_runs_after_transfer_without_lock() {
        let reg = Arc::new(registry());
        reg.mint(AssetId(1), addr(1)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_reg = Arc::clone(&reg);
        let seen_calls = Arc::clone(&calls);
        reg.set_transfer_hook(Arc::new(move |record: &TransferRecord| {
            // Reading the registry from the hook must not deadlock.
            assert_eq!(seen_reg.owner_of(record.asset_id), Some(record.to));
            seen_calls.fetch_add(1, Ordering::SeqCst);
        }));
        reg.transfer(&addr(1), AssetId(1), &addr(1), &addr(2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        reg.clear_transfer_hook();
        reg.transfer(&addr(2), AssetId(1), &addr(2), &addr(3)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_restores_holdings() {
        let reg = registry();
        reg.mint(AssetId(1), addr(1)).unwrap();
        reg.approve(&addr(1), AssetId(1), addr(9)).unwrap();
        let json = serde_json::to_string(&reg.snapshot()).unwrap();
        let restored =
            InMemoryAssetRegistry::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.address(), addr(0xaa));
        assert_eq!(restored.owner_of(AssetId(1)), Some(addr(1)));
        assert!(restored.is_approved_for_transfer(AssetId(1), &addr(9)));
    }
}
