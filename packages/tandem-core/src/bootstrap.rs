//! Application bootstrap and dependency wiring.
//!
//! The composition root: the one place where the session store is chosen and
//! every service is instantiated and wired together.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::client::LocalSessionApi;
use crate::clock::{Clock, SystemClock};
use crate::error::{TandemError, TandemResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{ServiceDeps, SessionManager, StalenessReclaimer, SyncEngine};
use crate::state::{Config, StoreConfig};
use crate::store::{HttpKvSessionStore, MemorySessionStore, SessionLocks, SessionStore};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Store backend selected at startup.
    pub store: Arc<dyn SessionStore>,
    /// Session lifecycle.
    pub manager: Arc<SessionManager>,
    /// Push/pull protocol.
    pub sync_engine: Arc<SyncEngine>,
    /// Idle session cleanup.
    pub reclaimer: Arc<StalenessReclaimer>,
    /// Event bridge feeding the server-sent event stream.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Validated configuration.
    pub config: Config,
    /// Cancelled on shutdown; stops background tasks and the HTTP server.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state over these services.
    pub fn app_state(&self) -> TandemResult<AppState> {
        AppState::builder()
            .manager(Arc::clone(&self.manager))
            .sync_engine(Arc::clone(&self.sync_engine))
            .event_bridge(Arc::clone(&self.event_bridge))
            .config(self.config.clone())
            .build()
    }

    /// In-process client API over these services.
    pub fn local_api(&self) -> LocalSessionApi {
        LocalSessionApi::new(Arc::clone(&self.manager), Arc::clone(&self.sync_engine))
    }

    /// Starts the optional background sweep.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_background_tasks(&self) {
        if self.config.sweep_interval_secs == 0 {
            log::info!("[Bootstrap] Background sweep disabled; reclaiming on access only");
            return;
        }
        self.reclaimer.spawn_sweeper(
            &TokioSpawner::current(),
            Duration::from_secs(self.config.sweep_interval_secs),
            self.cancel_token.clone(),
        );
    }

    /// Stops background tasks and runs a final sweep.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
        self.reclaimer.sweep_opportunistic().await;
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Selects the store backend.
///
/// An unreachable HTTP backend falls back to memory unless `require` is set.
///
/// # Errors
///
/// Returns [`TandemError::Configuration`] if a required backend is unusable.
pub async fn select_store(config: &StoreConfig) -> TandemResult<Arc<dyn SessionStore>> {
    let (url, token, require) = match config {
        StoreConfig::Memory => {
            log::info!("[Bootstrap] Using in-memory session store");
            return Ok(Arc::new(MemorySessionStore::new()));
        }
        StoreConfig::Http {
            url,
            token,
            require,
        } => (url, token, *require),
    };

    let probe = match HttpKvSessionStore::new(url, token.clone()) {
        Ok(store) => store.ping().await.map(|_| store),
        Err(e) => Err(e),
    };

    match probe {
        Ok(store) => {
            log::info!("[Bootstrap] Using HTTP key-value session store at {}", url);
            Ok(Arc::new(store))
        }
        Err(e) if require => Err(TandemError::Configuration(format!(
            "session store at {} unavailable: {}",
            url, e
        ))),
        Err(e) => {
            log::warn!(
                "[Bootstrap] Session store at {} unavailable ({}), falling back to memory",
                url,
                e
            );
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

/// Bootstraps all services with the system clock.
///
/// # Errors
///
/// Returns [`TandemError::Configuration`] for an invalid configuration or a
/// required store that cannot be reached.
pub async fn bootstrap_services(config: &Config) -> TandemResult<BootstrappedServices> {
    bootstrap_services_with_clock(config, SystemClock::arc()).await
}

/// Bootstraps all services with an explicit clock.
pub async fn bootstrap_services_with_clock(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> TandemResult<BootstrappedServices> {
    config.validate().map_err(TandemError::Configuration)?;

    let store = select_store(&config.store).await?;
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));

    let deps = ServiceDeps {
        store: Arc::clone(&store),
        locks: Arc::new(SessionLocks::new()),
        emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        clock,
    };
    let reclaimer = deps.reclaimer(config.idle_timeout_millis());
    let manager = Arc::new(SessionManager::new(deps.clone(), Arc::clone(&reclaimer), config));
    let sync_engine = Arc::new(SyncEngine::new(deps, Arc::clone(&reclaimer)));

    log::info!(
        "[Bootstrap] Services ready (store: {}, idle timeout: {}s)",
        store.backend_name(),
        config.idle_timeout_secs
    );

    Ok(BootstrappedServices {
        store,
        manager,
        sync_engine,
        reclaimer,
        event_bridge,
        config: config.clone(),
        cancel_token: CancellationToken::new(),
    })
}
