//! Headless CLI for SwapQuest.
//!
//! Each invocation builds a [`QuestController`](crate::controller::QuestController)
//! against a file-backed session store, runs startup detection and restore,
//! executes one command and shuts the reconciler down. Sessions therefore
//! survive across invocations the same way they survive a page reload.
//! `config` commands only touch the settings file and never start the
//! controller.
//!
//! ```text
//! +-----------+     +----------------+     +-----------+
//! | args.rs   | --> | bootstrap.rs   | --> | runner.rs | --> output.rs
//! | (clap)    |     | (controller)   |     | (command) |     (text/JSON)
//! +-----------+     +----------------+     +-----------+
//! ```

mod args;
mod bootstrap;
mod config;
mod output;
mod runner;

pub use args::{Args, Command, ConfigAction, SwapArgs};
pub use bootstrap::{initialize, CliContext};
pub use config::run_config;
pub use output::run_event_loop;
pub use runner::execute;
