//! Staleness reclamation for abandoned sessions.
//!
//! Sessions are deleted once `updatedAt` is older than the configured idle
//! window. Reclamation is opportunistic:
//!
//! - Entry points that create or list sessions run a full [`cleanup`] first.
//! - Every load of a single session goes through [`load_live`] (or
//!   [`load_live_locked`]), which deletes that one session if it is stale and
//!   reports it as absent.
//!
//! An optional background sweep ([`spawn_sweeper`]) bounds how long idle
//! sessions linger when no requests arrive.
//!
//! [`cleanup`]: StalenessReclaimer::cleanup
//! [`load_live`]: StalenessReclaimer::load_live
//! [`load_live_locked`]: StalenessReclaimer::load_live_locked
//! [`spawn_sweeper`]: StalenessReclaimer::spawn_sweeper

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::TandemResult;
use crate::events::{EndReason, EventEmitter, SessionEvent};
use crate::runtime::TaskSpawner;
use crate::session::Session;
use crate::store::{SessionLocks, SessionStore};

/// Deletes sessions that have been idle longer than the configured window.
pub struct StalenessReclaimer {
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    emitter: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
    idle_millis: u64,
}

impl StalenessReclaimer {
    /// Creates a new reclaimer.
    pub fn new(
        store: Arc<dyn SessionStore>,
        locks: Arc<SessionLocks>,
        emitter: Arc<dyn EventEmitter>,
        clock: Arc<dyn Clock>,
        idle_millis: u64,
    ) -> Self {
        Self {
            store,
            locks,
            emitter,
            clock,
            idle_millis,
        }
    }

    /// Returns the idle window in milliseconds.
    pub fn idle_millis(&self) -> u64 {
        self.idle_millis
    }

    /// Returns true if `session` is past the idle window right now.
    pub fn is_stale(&self, session: &Session) -> bool {
        session.is_stale(self.clock.now_millis(), self.idle_millis)
    }

    /// Deletes every stale session. Returns how many were removed.
    ///
    /// Each candidate is re-read under its session lock before deletion so a
    /// session touched after the listing is kept.
    pub async fn cleanup(&self) -> TandemResult<usize> {
        let candidates: Vec<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|s| self.is_stale(s))
            .map(|s| s.id)
            .collect();

        let mut removed = 0;
        for id in candidates {
            let guard = self.locks.lock(&id).await;
            let reclaimed = match self.store.get(&id).await? {
                Some(session) => self.expire_if_stale(&session).await?,
                None => false,
            };
            drop(guard);

            if reclaimed {
                self.locks.release(&id);
                removed += 1;
            }
        }

        self.locks.prune();
        if removed > 0 {
            log::info!("[Reclaimer] Reclaimed {} stale session(s)", removed);
        }
        Ok(removed)
    }

    /// Runs [`cleanup`](Self::cleanup), logging instead of propagating errors.
    ///
    /// Used at the top of entry points where a failed sweep must not fail the
    /// caller's own operation.
    pub async fn sweep_opportunistic(&self) {
        if let Err(e) = self.cleanup().await {
            log::warn!("[Reclaimer] Opportunistic sweep failed: {}", e);
        }
    }

    /// Loads a session, reclaiming it if stale.
    ///
    /// Takes the session lock only when a deletion is needed.
    pub async fn load_live(&self, id: &str) -> TandemResult<Option<Session>> {
        match self.store.get(id).await? {
            Some(session) if self.is_stale(&session) => {
                let guard = self.locks.lock(id).await;
                let live = self.load_live_locked(id).await?;
                drop(guard);
                if live.is_none() {
                    self.locks.release(id);
                }
                Ok(live)
            }
            other => Ok(other),
        }
    }

    /// Loads a session, reclaiming it if stale. Caller holds the session lock.
    pub async fn load_live_locked(&self, id: &str) -> TandemResult<Option<Session>> {
        match self.store.get(id).await? {
            Some(session) => {
                if self.expire_if_stale(&session).await? {
                    Ok(None)
                } else {
                    Ok(Some(session))
                }
            }
            None => Ok(None),
        }
    }

    /// Deletes `session` if stale. Caller holds the session lock.
    async fn expire_if_stale(&self, session: &Session) -> TandemResult<bool> {
        if !self.is_stale(session) {
            return Ok(false);
        }

        self.store.delete(&session.id).await?;
        let now = self.clock.now_millis();
        log::info!(
            "[Reclaimer] Session {} idle for {}s, deleted",
            session.id,
            now.saturating_sub(session.updated_at) / 1000
        );
        self.emitter.emit_session(SessionEvent::Ended {
            session_id: session.id.clone(),
            reason: EndReason::Reclaimed,
            timestamp: now,
        });
        Ok(true)
    }

    /// Starts a periodic background sweep until `cancel` fires.
    pub fn spawn_sweeper<S: TaskSpawner>(
        self: &Arc<Self>,
        spawner: &S,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let reclaimer = Arc::clone(self);
        spawner.spawn(async move {
            log::info!(
                "[Reclaimer] Background sweep every {}s",
                interval.as_secs()
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("[Reclaimer] Background sweep stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        reclaimer.sweep_opportunistic().await;
                    }
                }
            }
        });
    }
}
