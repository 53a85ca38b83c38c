//! Wallet identity and swap settlement controller for SwapQuest.
//!
//! The [`controller::QuestController`] detects the wallet host, restores or
//! establishes a signed-in session, keeps that session consistent across
//! contexts sharing one store, and drives token swaps through a two-phase
//! prove-then-settle protocol.

pub mod auth;
pub mod backend;
pub mod chain;
pub mod classify;
pub mod controller;
pub mod detect;
pub mod error;
pub mod events;
pub mod host;
pub mod identity;
pub mod payment;
pub mod session;
pub mod settings;
pub mod storage;
pub mod swap;

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
mod integration_tests;

pub use controller::{Collaborators, ControllerConfig, ControllerStatus, QuestController};
pub use error::{ErrorKind, QuestError, Result};
