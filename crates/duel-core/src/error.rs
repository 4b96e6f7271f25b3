//! # Error Types
//!
//! Parse and validation errors for the core identifier types.

use thiserror::Error;

/// Errors produced while constructing core identifiers from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Address string is not `0x` followed by 40 hex digits.
    #[error("invalid address \"{input}\": {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Asset reference string is not `<registry>:<asset id>`.
    #[error("invalid asset reference \"{0}\": expected <registry-address>:<asset-id>")]
    InvalidAssetRef(String),

    /// Numeric identifier failed to parse.
    #[error("invalid {kind} \"{input}\"")]
    InvalidNumber {
        /// Which identifier was being parsed.
        kind: &'static str,
        /// The rejected input.
        input: String,
    },
}
