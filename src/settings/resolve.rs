//! Turning loaded settings into controller configuration.

use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};

use super::loader::get_with_env_fallback;
use super::schema::QuestSettings;
use crate::auth::AuthConfig;
use crate::controller::ControllerConfig;
use crate::detect::DetectorConfig;
use crate::payment::PaymentConfig;
use crate::storage::default_storage_path;
use crate::swap::{SwapConfig, TokenTable};

/// One year. Longer settlement deadlines are treated as a typo.
const MAX_DEADLINE_SECS: i64 = 365 * 24 * 60 * 60;

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid address for {}: '{}'", field, value))
}

impl QuestSettings {
    /// Backend base URL from settings, then `SWAPQUEST_BACKEND_URL`.
    pub fn backend_url(&self) -> Option<String> {
        get_with_env_fallback(&self.backend.base_url, &["SWAPQUEST_BACKEND_URL"], None)
    }

    /// JSON-RPC URL from settings, then `SWAPQUEST_RPC_URL`.
    pub fn rpc_url(&self) -> Option<String> {
        get_with_env_fallback(&self.chain.rpc_url, &["SWAPQUEST_RPC_URL"], None)
    }

    pub fn storage_path(&self) -> PathBuf {
        match self.session.storage_path.as_deref() {
            Some(path) if !path.is_empty() => match path.strip_prefix("~/") {
                Some(rest) => dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(rest),
                None => PathBuf::from(path),
            },
            _ => default_storage_path(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn controller_config(&self) -> Result<ControllerConfig> {
        let call_timeout = Duration::from_secs(self.host.call_timeout_secs);
        let router = parse_address("chain.router_address", &self.chain.router_address)?;
        let wrapped_native =
            parse_address("chain.wrapped_native_address", &self.chain.wrapped_native_address)?;
        let deposit_address = parse_address("payment.deposit_address", &self.payment.deposit_address)?;
        let expiration = chrono::Duration::try_days(self.host.auth_expiration_days)
            .filter(|d| *d > chrono::Duration::zero())
            .with_context(|| {
                format!(
                    "host.auth_expiration_days out of range: {}",
                    self.host.auth_expiration_days
                )
            })?;
        let not_before = chrono::Duration::try_hours(self.host.auth_not_before_hours)
            .filter(|d| *d >= chrono::Duration::zero())
            .with_context(|| {
                format!(
                    "host.auth_not_before_hours out of range: {}",
                    self.host.auth_not_before_hours
                )
            })?;
        // The deadline is added to a unix timestamp in seconds
        i64::try_from(self.swap.deadline_secs)
            .ok()
            .filter(|secs| *secs <= MAX_DEADLINE_SECS)
            .with_context(|| format!("swap.deadline_secs out of range: {}", self.swap.deadline_secs))?;

        Ok(ControllerConfig {
            detector: DetectorConfig {
                settle: Duration::from_millis(self.host.settle_ms),
                overall_timeout: Duration::from_secs(self.host.detection_timeout_secs),
            },
            auth: AuthConfig {
                statement: self.host.statement.clone(),
                expiration,
                not_before,
                call_timeout,
            },
            swap: SwapConfig {
                router,
                default_slippage_bps: self.swap.default_slippage_bps,
                fee_tier: self.swap.fee_tier,
                deadline_secs: self.swap.deadline_secs,
                gas_estimate: self.swap.gas_estimate,
                price_impact_bps: self.swap.price_impact_bps,
                call_timeout,
                ..SwapConfig::default()
            },
            payment: PaymentConfig {
                deposit_address,
                call_timeout,
            },
            tokens: TokenTable::with_wrapped_native(wrapped_native),
            reconcile_interval: Duration::from_secs(self.session.reconcile_interval_secs.max(1)),
        })
    }
}
