//! # duel CLI entry point
//!
//! Parses command-line arguments, installs logging, and dispatches to the
//! subcommand handlers in [`duel_cli::commands`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use duel_cli::commands::{run_command, DuelCommand};
use duel_cli::resolve_state_path;

/// Two-party asset duel escrow.
///
/// Each player locks one non-fungible asset; resolution returns one asset to
/// its owner and burns the other. Resolution entropy is low assurance.
#[derive(Parser, Debug)]
#[command(name = "duel", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Escrow configuration file (YAML), read by `init`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file. Defaults to $DUEL_STATE or .duel/state.json.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: DuelCommand,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let state_path = resolve_state_path(cli.state);
    tracing::debug!(state = %state_path.display(), "duel CLI starting");

    match run_command(&cli.command, &state_path, cli.config.as_deref()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
