//! `config` subcommand.
//!
//! Runs against the settings file alone, without starting the controller, so
//! a file whose values stop the controller from starting can still be fixed.

use anyhow::Result;
use serde_json::{json, Value};

use crate::settings::SettingsManager;

use super::args::{Args, ConfigAction};
use super::bootstrap::{load_settings, prepare_environment};
use super::output::print_result;

/// Execute a `config` action.
pub async fn run_config(args: &Args, action: &ConfigAction) -> Result<()> {
    prepare_environment(args)?;
    let manager = load_settings(args).await?;
    apply(&manager, action, args.json).await
}

async fn apply(manager: &SettingsManager, action: &ConfigAction, json_mode: bool) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let value = manager.get_value(key).await?;
            let lines = vec![format!("{} = {}", key, value)];
            print_result(json_mode, "setting", &json!({ "key": key, "value": value }), &lines)
        }
        ConfigAction::Set { key, value } => {
            let value = parse_value(value);
            manager.set_value(key, value.clone()).await?;
            let lines = vec![format!("{} = {}", key, value)];
            print_result(json_mode, "setting", &json!({ "key": key, "value": value }), &lines)
        }
        ConfigAction::Reset => {
            manager.reset().await?;
            let path = manager.path().display().to_string();
            let lines = vec![format!("Settings reset to defaults ({})", path)];
            print_result(json_mode, "settings_reset", &json!({ "path": path }), &lines)
        }
    }
}

/// `500` and `true` keep their JSON types, anything unparseable is a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
