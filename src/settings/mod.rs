//! TOML-based settings for SwapQuest.
//!
//! Settings are loaded from `~/.swapquest/settings.toml` with environment
//! variable interpolation support. Endpoint URLs fall back to environment
//! variables through the `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use swapquest_lib::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//! let config = settings.controller_config()?;
//! let backend_url = settings.backend_url();
//! ```

pub mod loader;
mod resolve;
pub mod schema;

pub use loader::{get_with_env_fallback, resolve_env_ref, settings_path, SettingsManager};
pub use schema::QuestSettings;
