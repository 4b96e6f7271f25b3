//! # Escrow Error Types
//!
//! Every variant carries the duel, caller, or asset involved so a rejected
//! operation can be diagnosed from the error alone. Any error means the
//! operation had no effect on escrow state and published no event.

use thiserror::Error;

use duel_core::{Address, AssetRef, DuelId};

use crate::config::ConfigError;
use crate::duel::DuelStatus;
use crate::registry::RegistryError;

/// Errors arising from escrow operations.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// No live duel has this id (never created, withdrawn, or resolved).
    #[error("{duel_id} not found")]
    NotFound {
        /// The requested duel.
        duel_id: DuelId,
    },

    /// Caller is not the party entitled to perform the operation.
    #[error("{caller} is not authorized to {operation} {duel_id}")]
    Unauthorized {
        /// The target duel.
        duel_id: DuelId,
        /// The attempted operation.
        operation: &'static str,
        /// The rejected caller.
        caller: Address,
    },

    /// Duel is not in the status the operation requires.
    #[error("{duel_id} cannot {operation} in status {status}")]
    InvalidState {
        /// The target duel.
        duel_id: DuelId,
        /// The attempted operation.
        operation: &'static str,
        /// The duel's current status.
        status: DuelStatus,
    },

    /// Caller has not approved the escrow to move the asset.
    #[error("escrow {escrow} is not approved to move {asset} on behalf of {caller}")]
    NotApproved {
        /// The asset.
        asset: AssetRef,
        /// The caller who should have granted approval.
        caller: Address,
        /// The escrow address that needed approval.
        escrow: Address,
    },

    /// The asset registry refused a transfer.
    #[error("transfer of {asset} from {from} to {to} rejected: {source}")]
    TransferRejected {
        /// The asset.
        asset: AssetRef,
        /// Transfer source.
        from: Address,
        /// Transfer destination.
        to: Address,
        /// The registry's reason.
        #[source]
        source: RegistryError,
    },

    /// Another operation on this duel is mid-transfer. Raised when a
    /// registry calls back into the escrow during a transfer.
    #[error("{duel_id} has an operation in flight")]
    OperationInFlight {
        /// The target duel.
        duel_id: DuelId,
    },

    /// No registry is known at the asset's registry address.
    #[error("no asset registry at {0}")]
    UnknownRegistry(Address),

    /// Self-duels are disabled by policy.
    #[error("{player} cannot join their own {duel_id}")]
    SelfDuelForbidden {
        /// The target duel.
        duel_id: DuelId,
        /// The player who is both creator and would-be challenger.
        player: Address,
    },

    /// The escrow does not hold an asset a live duel references.
    #[error("escrow does not hold {asset}; registry reports holder {holder}")]
    CustodyMismatch {
        /// The asset.
        asset: AssetRef,
        /// The holder reported by the registry, or `none`.
        holder: String,
    },

    /// No payout of the asset is held for the caller.
    #[error("no payout of {asset} is held for {caller}")]
    NoPayout {
        /// The asset.
        asset: AssetRef,
        /// The caller who tried to claim it.
        caller: Address,
    },

    /// The duel id counter cannot advance.
    #[error("duel id space exhausted")]
    IdExhausted,

    /// A snapshot failed validation on restore.
    #[error("invalid escrow snapshot: {0}")]
    InvalidSnapshot(String),

    /// Escrow configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EscrowError {
    /// Short machine-readable kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidState { .. } => "invalid_state",
            Self::NotApproved { .. } => "not_approved",
            Self::TransferRejected { .. } => "transfer_rejected",
            Self::OperationInFlight { .. } => "operation_in_flight",
            Self::UnknownRegistry(_) => "unknown_registry",
            Self::SelfDuelForbidden { .. } => "self_duel_forbidden",
            Self::CustodyMismatch { .. } => "custody_mismatch",
            Self::NoPayout { .. } => "no_payout",
            Self::IdExhausted => "id_exhausted",
            Self::InvalidSnapshot(_) => "invalid_snapshot",
            Self::Config(_) => "config",
        }
    }
}
