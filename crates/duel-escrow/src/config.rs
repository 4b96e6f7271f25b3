//! Escrow configuration.
//!
//! Defaults suit a single local escrow. Override via environment variables,
//! a YAML file (loaded by the CLI), or explicit construction in tests.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use duel_core::{Address, CoreError};

/// Default escrow address, `0x000000000000000000000000000000000000d0e1`.
pub const DEFAULT_ESCROW_ADDRESS: Address = Address::from_bytes([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xd0, 0xe1,
]);

/// Whether a creator may join their own duel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfDuelPolicy {
    /// Player 1 may also be player 2.
    #[default]
    Allow,
    /// `join` rejects player 1.
    Forbid,
}

impl FromStr for SelfDuelPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "forbid" => Ok(Self::Forbid),
            other => Err(ConfigError::InvalidPolicy(other.to_string())),
        }
    }
}

/// Escrow identity and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// The address the escrow holds assets under and is approved as.
    pub escrow_address: Address,
    /// Where losing assets are sent.
    pub burn_sink: Address,
    /// Self-duel policy.
    pub self_duel: SelfDuelPolicy,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            escrow_address: DEFAULT_ESCROW_ADDRESS,
            burn_sink: Address::BURN_SINK,
            self_duel: SelfDuelPolicy::Allow,
        }
    }
}

impl EscrowConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DUEL_ESCROW_ADDRESS` (default: `0x000000000000000000000000000000000000d0e1`)
    /// - `DUEL_BURN_SINK` (default: `0x000000000000000000000000000000000000dead`)
    /// - `DUEL_SELF_DUEL` (`allow` | `forbid`, default: `allow`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            escrow_address: env_address("DUEL_ESCROW_ADDRESS", defaults.escrow_address)?,
            burn_sink: env_address("DUEL_BURN_SINK", defaults.burn_sink)?,
            self_duel: match std::env::var("DUEL_SELF_DUEL") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.self_duel,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the escrow cannot operate under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escrow_address.is_zero() {
            return Err(ConfigError::ZeroAddress("escrow_address"));
        }
        if self.burn_sink.is_zero() {
            return Err(ConfigError::ZeroAddress("burn_sink"));
        }
        if self.burn_sink == self.escrow_address {
            return Err(ConfigError::BurnSinkIsEscrow(self.burn_sink));
        }
        Ok(())
    }
}

fn env_address(var: &str, default: Address) -> Result<Address, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(var.to_string(), e)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address in {0}: {1}")]
    InvalidAddress(String, CoreError),
    #[error("invalid self-duel policy \"{0}\": expected allow or forbid")]
    InvalidPolicy(String),
    #[error("{0} must not be the zero address")]
    ZeroAddress(&'static str),
    #[error("burn sink {0} must differ from the escrow address")]
    BurnSinkIsEscrow(Address),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EscrowConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.burn_sink, Address::BURN_SINK);
        assert_eq!(cfg.self_duel, SelfDuelPolicy::Allow);
    }

    #[test]
    fn burn_sink_equal_to_escrow_rejected() {
        let cfg = EscrowConfig {
            burn_sink: DEFAULT_ESCROW_ADDRESS,
            ..EscrowConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BurnSinkIsEscrow(_))
        ));
    }

    #[test]
    fn zero_escrow_rejected() {
        let cfg = EscrowConfig {
            escrow_address: Address::ZERO,
            ..EscrowConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroAddress(_))));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Forbid".parse::<SelfDuelPolicy>().unwrap(), SelfDuelPolicy::Forbid);
        assert_eq!(" allow ".parse::<SelfDuelPolicy>().unwrap(), SelfDuelPolicy::Allow);
        assert!("maybe".parse::<SelfDuelPolicy>().is_err());
    }

    #[test]
    fn env_address_uses_default_when_var_absent() {
        let addr = env_address("NONEXISTENT_DUEL_VAR_12345", Address::BURN_SINK).unwrap();
        assert_eq!(addr, Address::BURN_SINK);
    }

    #[test]
    fn env_address_rejects_invalid_value() {
        std::env::set_var("TEST_BAD_DUEL_ADDR", "not an address");
        let result = env_address("TEST_BAD_DUEL_ADDR", Address::BURN_SINK);
        std::env::remove_var("TEST_BAD_DUEL_ADDR");
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let cfg: EscrowConfig = serde_json::from_str(r#"{"self_duel":"forbid"}"#).unwrap();
        assert_eq!(cfg.self_duel, SelfDuelPolicy::Forbid);
        assert_eq!(cfg.escrow_address, DEFAULT_ESCROW_ADDRESS);
    }
}
