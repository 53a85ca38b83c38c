//! CLI bootstrap - wire the controller to its collaborators for CLI usage.
//!
//! With `--simulate` every collaborator runs in process. Otherwise the backend
//! and chain are reached over HTTP and the host slot stays empty until a
//! wallet host registers, which a plain terminal never does.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{BackendClient, HttpBackend, LocalBackend};
use crate::chain::{ChainReader, JsonRpcChain, MemoryChain};
use crate::controller::{Collaborators, QuestController};
use crate::host::{EnvironmentSignals, HostSlot, SimulatedHost};
use crate::settings::{QuestSettings, SettingsManager};
use crate::storage::{FileStore, KeyValueStore};
use crate::swap::tokens::{USDC, WLD};
use crate::swap::StaticRateTable;

use super::args::Args;

/// Context for CLI execution containing the started controller.
pub struct CliContext {
    pub controller: QuestController,

    /// Settings manager
    pub settings_manager: Arc<SettingsManager>,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Graceful shutdown - stop the reconciler.
    pub async fn shutdown(self) -> Result<()> {
        self.controller.shutdown().await;
        Ok(())
    }
}

/// Initialize logging, settings and the controller, then run startup
/// detection and session restore.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    prepare_environment(args)?;
    let settings_manager = load_settings(args).await?;

    let settings = settings_manager.get().await;
    let storage_path = args
        .storage
        .clone()
        .unwrap_or_else(|| settings.storage_path());

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Session storage: {}", storage_path.display());
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(storage_path));
    let collaborators = if args.simulate {
        simulated_collaborators(store)
    } else {
        remote_collaborators(&settings, store)?
    };

    let controller = QuestController::new(collaborators, settings.controller_config()?);
    let status = controller.start().await;

    if args.verbose {
        eprintln!(
            "[cli] Host {}, session {}",
            status.host_state, status.session_state
        );
    }

    Ok(CliContext {
        controller,
        settings_manager,
        args: args.clone(),
    })
}

/// Load `.env` and install the log subscriber.
pub(super) fn prepare_environment(args: &Args) -> Result<()> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    init_logging(args.verbose)
}

/// Open the settings file named by `--settings` (or the default one),
/// creating the commented template on first run.
pub(super) async fn load_settings(args: &Args) -> Result<Arc<SettingsManager>> {
    let settings_manager = Arc::new(
        match &args.settings {
            Some(path) => SettingsManager::with_path(path).await,
            None => SettingsManager::new().await,
        }
        .context("Failed to initialize settings manager")?,
    );

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    Ok(settings_manager)
}

fn init_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let directive = format!("swapquest_lib={}", log_level)
        .parse()
        .context("Invalid log directive")?;
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .try_init();
    Ok(())
}

/// In-process host, backend and chain.
fn simulated_collaborators(store: Arc<dyn KeyValueStore>) -> Collaborators {
    let host = Arc::new(SimulatedHost::new());
    let chain = MemoryChain::new()
        .with_token(WLD, "WLD", 18)
        .with_token(USDC, "USDC", 6);

    Collaborators {
        slot: HostSlot::with_host(host),
        signals: EnvironmentSignals::from_env(),
        store,
        backend: Arc::new(LocalBackend::new()),
        chain: Arc::new(chain),
        oracle: Arc::new(StaticRateTable::default()),
    }
}

fn remote_collaborators(
    settings: &QuestSettings,
    store: Arc<dyn KeyValueStore>,
) -> Result<Collaborators> {
    let timeout = settings.request_timeout();

    let backend_url = settings.backend_url().ok_or_else(|| {
        anyhow::anyhow!(
            "No backend URL configured. Set 'backend.base_url' in ~/.swapquest/settings.toml, \
             export SWAPQUEST_BACKEND_URL, or use --simulate"
        )
    })?;
    let backend: Arc<dyn BackendClient> =
        Arc::new(HttpBackend::new(&backend_url, timeout).context("Failed to create backend client")?);

    let chain: Arc<dyn ChainReader> = match settings.rpc_url() {
        Some(url) => Arc::new(JsonRpcChain::new(&url, timeout).context("Failed to create RPC client")?),
        None => {
            tracing::warn!("No RPC URL configured, token metadata falls back to the static table");
            let chain = MemoryChain::new();
            chain.set_offline(true);
            Arc::new(chain)
        }
    };

    Ok(Collaborators {
        slot: HostSlot::new(),
        signals: EnvironmentSignals::from_env(),
        store,
        backend,
        chain,
        oracle: Arc::new(StaticRateTable::default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use clap::Parser;

    #[test]
    fn test_remote_requires_backend_url() {
        std::env::remove_var("SWAPQUEST_BACKEND_URL");
        let settings = QuestSettings::default();
        let err = remote_collaborators(&settings, Arc::new(MemoryStore::new()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("--simulate"));
    }

    #[test]
    fn test_remote_with_backend_url() {
        let mut settings = QuestSettings::default();
        settings.backend.base_url = Some("http://127.0.0.1:3000".to_string());
        let collaborators = remote_collaborators(&settings, Arc::new(MemoryStore::new())).unwrap();
        assert!(collaborators.slot.current().is_none());
    }

    #[tokio::test]
    async fn test_simulated_initialize_with_temp_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage.json");
        let settings = dir.path().join("settings.toml");
        let args = Args::parse_from([
            "swapquest-cli",
            "--simulate",
            "--storage",
            storage.to_str().unwrap(),
            "--settings",
            settings.to_str().unwrap(),
            "status",
        ]);

        let ctx = initialize(&args).await.unwrap();
        assert!(settings.exists());
        assert_eq!(ctx.controller.status().session_state, "disconnected");
        ctx.shutdown().await.unwrap();
    }
}
