//! # duel-cli - Command Line for the Duel Escrow
//!
//! Provides the `duel` binary. All state lives in one JSON file (see
//! [`state`]); each invocation loads it, performs one operation, and writes
//! it back.
//!
//! ```bash
//! duel init --registry 0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
//! duel mint --registry 0xaaaa… --asset 1 --to 0x1111…
//! duel approve --registry 0xaaaa… --asset 1 --holder 0x1111…
//! duel create --caller 0x1111… --asset 0xaaaa…:1
//! duel join --caller 0x2222… --asset 0xaaaa…:2 --duel 0
//! duel resolve --caller 0x1111… --duel 0 --seed block-1 --timestamp 1700000000
//! duel events --duel 0
//! ```

pub mod commands;
pub mod state;

use std::path::PathBuf;

/// State file used when `--state` is not given.
pub const DEFAULT_STATE_FILE: &str = ".duel/state.json";

/// The state file path: `--state` if given, otherwise `DUEL_STATE`,
/// otherwise [`DEFAULT_STATE_FILE`] under the current directory.
pub fn resolve_state_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os("DUEL_STATE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
}
