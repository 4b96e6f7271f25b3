//! # SHA-256 Digests
//!
//! The single hashing path for the workspace. Resolution hashing, simulated
//! block seeds, and content digests all go through [`Sha256Accumulator`] or
//! [`sha256_raw`].
//!
//! Fields are fed to the accumulator in a fixed order with fixed-width
//! encodings (addresses as 20 raw bytes, integers big-endian), so the same
//! inputs always produce the same digest regardless of platform.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::Address;

/// A 32-byte SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Wrap raw digest bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Lowest bit of the digest read as a big-endian 256-bit integer.
    ///
    /// `true` when the integer is odd.
    pub fn is_odd(&self) -> bool {
        self.bytes[31] & 1 == 1
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Hash a byte slice.
pub fn sha256_raw(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental SHA-256 over typed fields.
#[derive(Clone, Default)]
pub struct Sha256Accumulator {
    hasher: Sha256,
}

impl std::fmt::Debug for Sha256Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sha256Accumulator").finish_non_exhaustive()
    }
}

impl Sha256Accumulator {
    /// Start an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Append an address as its 20 raw bytes.
    pub fn address(self, address: &Address) -> Self {
        self.bytes(address.as_bytes())
    }

    /// Append a `u64` big-endian.
    pub fn u64(self, value: u64) -> Self {
        self.bytes(&value.to_be_bytes())
    }

    /// Finish hashing.
    pub fn finish(self) -> ContentDigest {
        ContentDigest::new(self.hasher.finalize().into())
    }
}
