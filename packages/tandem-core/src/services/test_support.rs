//! Shared fixture for service tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, ManualClock};
use crate::events::{EventEmitter, RecordingEventEmitter};
use crate::services::{ServiceDeps, SessionManager, StalenessReclaimer, SyncEngine};
use crate::state::Config;
use crate::store::{MemorySessionStore, SessionLocks, SessionStore};
use crate::utils::generate_session_code;

pub(crate) const START_MILLIS: u64 = 1_700_000_000_000;

/// Services wired over an in-memory store, a manual clock and a recording
/// emitter.
pub(crate) struct Harness {
    pub store: Arc<MemorySessionStore>,
    pub clock: Arc<ManualClock>,
    pub emitter: Arc<RecordingEventEmitter>,
    pub config: Config,
    pub reclaimer: Arc<StalenessReclaimer>,
    pub manager: Arc<SessionManager>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_codes(&[])
    }

    /// Session codes are handed out from `codes` first, then generated.
    pub fn with_codes(codes: &[&str]) -> Self {
        Self::build(Config::default(), codes)
    }

    pub fn build(config: Config, codes: &[&str]) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let emitter = Arc::new(RecordingEventEmitter::default());

        let deps = ServiceDeps {
            store: Arc::clone(&store) as Arc<dyn SessionStore>,
            locks: Arc::new(SessionLocks::new()),
            emitter: Arc::clone(&emitter) as Arc<dyn EventEmitter>,
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
        };
        let reclaimer = deps.reclaimer(config.idle_timeout_millis());

        let queue = Mutex::new(codes.iter().map(|c| c.to_string()).collect::<VecDeque<_>>());
        let manager = Arc::new(
            SessionManager::new(deps.clone(), Arc::clone(&reclaimer), &config).with_code_generator(
                move |len| {
                    queue
                        .lock()
                        .pop_front()
                        .unwrap_or_else(|| generate_session_code(len))
                },
            ),
        );
        let engine = Arc::new(SyncEngine::new(deps, Arc::clone(&reclaimer)));

        Self {
            store,
            clock,
            emitter,
            config,
            reclaimer,
            manager,
            engine,
        }
    }

    /// Moves the clock just past the idle window.
    pub fn expire(&self) {
        self.clock
            .advance_millis(self.config.idle_timeout_millis() + 1);
    }
}
