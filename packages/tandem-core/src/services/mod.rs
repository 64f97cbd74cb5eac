//! Application services layer.
//!
//! Business logic between the HTTP API and the session store:
//!
//! - [`SessionManager`]: create, join, leave, host migration
//! - [`SyncEngine`]: host pushes and snapshot pulls
//! - [`StalenessReclaimer`]: deletion of idle sessions
//!
//! Every read-modify-write of a session runs under that session's entry in
//! the shared [`SessionLocks`].

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{TandemError, TandemResult};
use crate::events::EventEmitter;
use crate::store::{SessionLocks, SessionStore};
use crate::utils::normalize_session_code;

pub mod reclaimer;
pub mod session_manager;
pub mod sync_engine;

#[cfg(test)]
pub(crate) mod test_support;

pub use reclaimer::StalenessReclaimer;
pub use session_manager::{LeaveOutcome, SessionAction, SessionManager, SessionReply};
pub use sync_engine::{SyncAction, SyncEngine, SyncPush};

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub store: Arc<dyn SessionStore>,
    pub locks: Arc<SessionLocks>,
    pub emitter: Arc<dyn EventEmitter>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDeps {
    /// Builds a reclaimer over the same store, locks, emitter and clock.
    pub fn reclaimer(&self, idle_millis: u64) -> Arc<StalenessReclaimer> {
        Arc::new(StalenessReclaimer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.emitter),
            Arc::clone(&self.clock),
            idle_millis,
        ))
    }
}

/// Normalizes a session code from a request.
///
/// A code that cannot be normalized cannot name a stored session, so it is
/// reported as not found.
pub(crate) fn session_code(raw: &str) -> TandemResult<String> {
    normalize_session_code(raw).ok_or_else(|| TandemError::SessionNotFound(raw.trim().to_string()))
}

/// Rejects an empty required identity field.
pub(crate) fn require_field(name: &str, value: &str) -> TandemResult<()> {
    if value.trim().is_empty() {
        return Err(TandemError::InvalidRequest(format!("{} must not be empty", name)));
    }
    Ok(())
}
