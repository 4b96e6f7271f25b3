//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the escrow handles. These prevent
//! identifier confusion: a `DuelId` cannot be passed where an `AssetId` is
//! expected, and an asset is only ever addressed through an [`AssetRef`]
//! that names both its registry and its id.
//!
//! ## Text Forms
//!
//! - `Address`: `0x` followed by 40 hex digits (case-insensitive on input,
//!   lowercase on output).
//! - `AssetRef`: `<registry-address>:<asset-id>`.
//! - `DuelId` / `AssetId`: decimal integers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ─── Address ─────────────────────────────────────────────────────────

/// A 20-byte account or registry address. Defaults to [`Address::ZERO`].
///
/// Serializes as its `0x`-prefixed hex string so that snapshots and event
/// logs stay human-readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address. Never a valid player.
    pub const ZERO: Address = Address([0u8; 20]);

    /// The well-known burn sink, `0x000000000000000000000000000000000000dead`.
    ///
    /// Assets sent here are irrecoverable: registries refuse any transfer
    /// whose source is this address.
    pub const BURN_SINK: Address = Address([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xde, 0xad,
    ]);

    /// Construct from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase `0x`-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        let body: String = self.0.iter().map(|b| format!("{b:02x}")).collect();
        format!("0x{body}")
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidAddress {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("non-hex digit"));
        }
        if body.len() != 40 {
            return Err(invalid("expected 40 hex digits"));
        }
        let mut bytes = [0u8; 20];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&body[2 * i..2 * i + 2], 16)
                .map_err(|_| invalid("non-hex digit"))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_hex()
    }
}

// ─── AssetId ─────────────────────────────────────────────────────────

/// Identifier of one non-fungible asset inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidNumber {
                kind: "asset id",
                input: s.to_string(),
            })
    }
}

// ─── AssetRef ────────────────────────────────────────────────────────

/// A reference to one non-fungible asset: the registry that owns it and
/// its id within that registry. Immutable once recorded in a duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef {
    /// Address of the asset registry.
    pub registry: Address,
    /// Asset id within the registry.
    pub asset_id: AssetId,
}

impl AssetRef {
    /// Build a reference.
    pub fn new(registry: Address, asset_id: AssetId) -> Self {
        Self { registry, asset_id }
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.registry, self.asset_id)
    }
}

impl FromStr for AssetRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (registry, asset_id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidAssetRef(s.to_string()))?;
        Ok(Self {
            registry: registry.parse()?,
            asset_id: asset_id.parse()?,
        })
    }
}

// ─── DuelId ──────────────────────────────────────────────────────────

/// Identifier of a duel. Allocated from a strictly increasing counter and
/// never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(pub u64);

impl DuelId {
    /// The first id handed out by a fresh escrow.
    pub const FIRST: DuelId = DuelId(0);

    /// The id following this one, or `None` on counter exhaustion.
    pub fn next(self) -> Option<DuelId> {
        self.0.checked_add(1).map(DuelId)
    }
}

impl std::fmt::Display for DuelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "duel:{}", self.0)
    }
}

impl FromStr for DuelId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("duel:").unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidNumber {
                kind: "duel id",
                input: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burn_sink_renders_dead() {
        assert_eq!(
            Address::BURN_SINK.to_string(),
            "0x000000000000000000000000000000000000dead"
        );
    }

    #[test]
    fn address_parses_mixed_case() {
        let addr: Address = "0x000000000000000000000000000000000000dEaD".parse().unwrap();
        assert_eq!(addr, Address::BURN_SINK);
    }

    #[test]
    fn address_rejects_missing_prefix() {
        let err = "000000000000000000000000000000000000dead"
            .parse::<Address>()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress { .. }));
    }

    #[test]
    fn address_rejects_short_input() {
        assert!("0xdead".parse::<Address>().is_err());
    }

    #[test]
    fn address_rejects_non_hex() {
        assert!("0x00000000000000000000000000000000000000zz"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::BURN_SINK.is_zero());
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let json = serde_json::to_string(&Address::BURN_SINK).unwrap();
        assert_eq!(json, "\"0x000000000000000000000000000000000000dead\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Address::BURN_SINK);
    }

    #[test]
    fn address_deserialize_rejects_garbage() {
        assert!(serde_json::from_str::<Address>("\"not-an-address\"").is_err());
    }

    #[test]
    fn asset_ref_display_and_parse() {
        let r = AssetRef::new(Address::from_bytes([0x11; 20]), AssetId(7));
        let text = r.to_string();
        assert_eq!(text, "0x1111111111111111111111111111111111111111:7");
        assert_eq!(text.parse::<AssetRef>().unwrap(), r);
    }

    #[test]
    fn asset_ref_rejects_missing_separator() {
        assert!(matches!(
            "0x1111111111111111111111111111111111111111".parse::<AssetRef>(),
            Err(CoreError::InvalidAssetRef(_))
        ));
    }

    #[test]
    fn duel_id_next_is_strictly_greater() {
        let id = DuelId::FIRST;
        let next = id.next().unwrap();
        assert!(next > id);
        assert_eq!(DuelId(u64::MAX).next(), None);
    }

    #[test]
    fn duel_id_parses_with_or_without_prefix() {
        assert_eq!("3".parse::<DuelId>().unwrap(), DuelId(3));
        assert_eq!("duel:3".parse::<DuelId>().unwrap(), DuelId(3));
        assert!("duel:x".parse::<DuelId>().is_err());
    }

    #[test]
    fn duel_id_display() {
        assert_eq!(DuelId(12).to_string(), "duel:12");
    }
}
