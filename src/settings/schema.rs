//! Settings schema for SwapQuest.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with the same defaults the controller uses.

use serde::{Deserialize, Serialize};

use crate::auth::DEFAULT_STATEMENT;

/// Root settings structure.
///
/// Loaded from `~/.swapquest/settings.toml` with environment variable interpolation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Backend collaborator (nonces, sign-in verification, payments)
    pub backend: BackendSettings,

    /// JSON-RPC endpoint and on-chain addresses
    pub chain: ChainSettings,

    /// Wallet host detection and call bounds
    pub host: HostSettings,

    pub session: SessionSettings,

    pub swap: SwapSettings,

    pub payment: PaymentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the app API (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// JSON-RPC URL (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,

    pub router_address: String,

    pub wrapped_native_address: String,

    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Wait for the host SDK to register, in milliseconds
    pub settle_ms: u64,

    /// Overall bound on host detection
    pub detection_timeout_secs: u64,

    /// Bound on every host and backend call
    pub call_timeout_secs: u64,

    /// Sign-in statement shown by the host
    pub statement: String,

    pub auth_expiration_days: i64,

    pub auth_not_before_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub reconcile_interval_secs: u64,

    /// Storage file; defaults to `~/.swapquest/storage.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapSettings {
    pub default_slippage_bps: u32,
    pub fee_tier: u32,
    pub deadline_secs: u64,
    pub gas_estimate: u64,
    pub price_impact_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub deposit_address: String,
}

impl Default for QuestSettings {
    fn default() -> Self {
        Self {
            version: 1,
            backend: BackendSettings::default(),
            chain: ChainSettings::default(),
            host: HostSettings::default(),
            session: SessionSettings::default(),
            swap: SwapSettings::default(),
            payment: PaymentSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            router_address: "0x68b3465833fb72A70ecDF485E0e4C7bD8665Fc45".to_string(),
            wrapped_native_address: "0x4200000000000000000000000000000000000006".to_string(),
            explorer_url: "https://worldscan.org".to_string(),
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            detection_timeout_secs: 10,
            call_timeout_secs: 120,
            statement: DEFAULT_STATEMENT.to_string(),
            auth_expiration_days: 7,
            auth_not_before_hours: 24,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 5,
            storage_path: None,
        }
    }
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            default_slippage_bps: 100,
            fee_tier: 3000,
            deadline_secs: 1200,
            gas_estimate: 300_000,
            price_impact_bps: 30,
        }
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            deposit_address: "0x742d35Cc6634C0532925a3b8D20Eb0d8f4C2f35f".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = QuestSettings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.host.settle_ms, 500);
        assert_eq!(settings.host.call_timeout_secs, 120);
        assert_eq!(settings.session.reconcile_interval_secs, 5);
        assert_eq!(settings.swap.fee_tier, 3000);
        assert!(settings.backend.base_url.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            version = 1
            [swap]
            default_slippage_bps = 300
        "#;

        let settings: QuestSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.swap.default_slippage_bps, 300);
        // Defaults should fill in missing fields
        assert_eq!(settings.swap.deadline_secs, 1200);
        assert_eq!(settings.host.auth_expiration_days, 7);
    }

    #[test]
    fn test_serialize_settings() {
        let settings = QuestSettings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        assert!(toml_str.contains("version = 1"));
        assert!(toml_str.contains("[swap]"));
        assert!(!toml_str.contains("base_url"));
    }
}
