//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for swapquest-cli.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SwapQuest CLI - Headless wallet sign-in, swaps and deposits
#[derive(Parser, Debug, Clone)]
#[command(name = "swapquest-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Run against an in-process wallet host, backend and chain
    #[arg(long)]
    pub simulate: bool,

    /// Output results as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Session storage file (default: ~/.swapquest/storage.json)
    #[arg(long, env = "SWAPQUEST_STORAGE")]
    pub storage: Option<PathBuf>,

    /// Settings file (default: ~/.swapquest/settings.toml)
    #[arg(long, env = "SWAPQUEST_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show host detection and session state
    Status,
    /// Restore the stored session or sign in with the wallet host
    Login,
    /// Clear the session everywhere
    Logout,
    /// Quote a swap without executing it
    Quote(SwapArgs),
    /// Prove and settle a swap
    Swap(SwapArgs),
    /// Deposit WLD or USDC into the platform
    Deposit {
        /// Human amount, e.g. 2.5
        amount: String,
        #[arg(long, default_value = "WLD")]
        token: String,
    },
    /// Prove the signed-in user is a unique human
    Verify,
    /// Attest a message with an identity proof
    Sign { message: String },
    /// Read or change the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print a setting by dotted key, e.g. swap.fee_tier
    Get { key: String },
    /// Set a setting by dotted key. The value is read as JSON, falling back to a string
    Set { key: String, value: String },
    /// Restore every setting to its default
    Reset,
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct SwapArgs {
    /// Input token symbol or address
    #[arg(long)]
    pub from: String,

    /// Output token symbol or address
    #[arg(long)]
    pub to: String,

    /// Human input amount, e.g. 1.0
    #[arg(long)]
    pub amount: String,

    /// Slippage tolerance in basis points (default from settings)
    #[arg(long)]
    pub slippage_bps: Option<u32>,
}
