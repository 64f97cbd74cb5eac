//! HTTP API layer.
//!
//! Thin handlers that delegate to services, plus router construction and
//! server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::TandemError;
use crate::events::BroadcastEventBridge;
use crate::protocol_constants::DEFAULT_PORT_RANGE;
use crate::services::{SessionManager, SyncEngine};
use crate::state::Config;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// Holds references to services; all business logic lives in the services.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle.
    pub manager: Arc<SessionManager>,
    /// Push/pull protocol.
    pub sync_engine: Arc<SyncEngine>,
    /// Source of the server-sent event stream.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    manager: Option<Arc<SessionManager>>,
    sync_engine: Option<Arc<SyncEngine>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    config: Option<Config>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(mut self, manager: Arc<SessionManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn sync_engine(mut self, engine: Arc<SyncEngine>) -> Self {
        self.sync_engine = Some(engine);
        self
    }

    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    /// Sets the configuration. Defaults to [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Configuration`] naming the first missing service.
    pub fn build(self) -> Result<AppState, TandemError> {
        let missing = |name: &str| TandemError::Configuration(format!("{} is required", name));
        Ok(AppState {
            manager: self.manager.ok_or_else(|| missing("manager"))?,
            sync_engine: self.sync_engine.ok_or_else(|| missing("sync_engine"))?,
            event_bridge: self.event_bridge.ok_or_else(|| missing("event_bridge"))?,
            config: Arc::new(RwLock::new(self.config.unwrap_or_default())),
        })
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

async fn find_available_port(start: u16, end: u16) -> Result<(u16, TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port, or the first free one in the default range.
pub async fn bind(preferred_port: u16) -> Result<(u16, TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, TcpListener::bind(&addr).await?))
    } else {
        let (start, end) = DEFAULT_PORT_RANGE;
        find_available_port(start, end).await
    }
}

/// Serves the API on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Binds and serves until `shutdown` fires.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = bind(preferred_port).await?;
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);
    serve(listener, state, shutdown).await
}
