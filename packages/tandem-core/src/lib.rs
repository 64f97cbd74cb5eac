//! Tandem Core - shared library for Tandem listening sessions.
//!
//! A small group joins a session by its short code. One member, the host,
//! controls playback; everyone else periodically pulls the host's state and
//! drives their own local player to match it.
//!
//! # Architecture
//!
//! - [`session`]: session, participant and track records
//! - [`store`]: session persistence behind the [`SessionStore`] trait
//! - [`services`]: session lifecycle, sync protocol and idle reclamation
//! - [`api`]: HTTP surface over the services
//! - [`client`]: host publisher and follower loop for listener processes
//! - [`events`]: domain events for subscribers
//! - [`bootstrap`]: composition root
//!
//! # Abstraction Traits
//!
//! - [`SessionStore`](store::SessionStore): session persistence
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//! - [`Clock`](clock::Clock): wall-clock time for activity stamps
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`SessionApi`](client::SessionApi): reaching the session service
//! - [`PlaybackEngine`](client::PlaybackEngine): the local player

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod clock;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, TandemError, TandemResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EndReason, EventEmitter, PlaybackEvent, SessionEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{Participant, Session, SyncSnapshot, Track};
pub use state::{Config, StoreConfig};
pub use store::{HttpKvSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use utils::{generate_session_code, normalize_session_code, now_millis};

pub use services::{
    LeaveOutcome, SessionAction, SessionManager, SessionReply, StalenessReclaimer, SyncAction,
    SyncEngine, SyncPush,
};

pub use client::{
    ClientError, ClientResult, FollowerConfig, FollowerEvent, FollowerHandle, HostPublisher,
    HttpSessionApi, Identity, LocalSessionApi, PlaybackEngine, PublisherConfig, SessionApi,
    SessionEndReason, SessionFollower,
};

pub use bootstrap::{bootstrap_services, select_store, BootstrappedServices};

pub use api::{bind, serve, start_server, AppState, AppStateBuilder, ServerError};
