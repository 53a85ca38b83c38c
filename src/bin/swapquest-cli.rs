//! SwapQuest CLI - Headless wallet sign-in, swaps and deposits
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --bin swapquest-cli
//!
//! # Sign in against the in-process host and backend
//! ./target/debug/swapquest-cli --simulate login
//!
//! # Quote and execute a swap
//! ./target/debug/swapquest-cli --simulate quote --from ETH --to WLD --amount 1.0
//! ./target/debug/swapquest-cli --simulate swap --from WLD --to USDC --amount 10 --slippage-bps 300
//!
//! # Inspect or change settings without starting the controller
//! ./target/debug/swapquest-cli config get swap.default_slippage_bps
//! ./target/debug/swapquest-cli config reset
//!
//! # JSON output for scripting
//! ./target/debug/swapquest-cli --simulate --json status | jq .
//! ```

use anyhow::Result;
use clap::Parser;

use swapquest_lib::cli::{execute, initialize, run_config, Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Config { action } = &args.command {
        return run_config(&args, action).await;
    }

    let ctx = initialize(&args).await?;

    let result = execute(&ctx).await;

    // Graceful shutdown
    ctx.shutdown().await?;

    result
}
