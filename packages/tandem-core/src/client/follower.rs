//! Participant pull loop.
//!
//! A [`SessionFollower`] pulls the session snapshot on a fixed interval,
//! keeps the local roster cache current and, while this client is not the
//! host, reconciles local playback against the snapshot.
//!
//! Failure handling:
//!
//! - transient pull failures are retried on the next tick; after
//!   `connectivity_warning_after` consecutive misses a single
//!   [`FollowerEvent::ConnectivityWarning`] is raised
//! - other failures (the server answered, but with a 4xx) are logged and
//!   retried without counting as a miss
//! - a vanished session or a missing roster entry ends the loop after one
//!   [`FollowerEvent::SessionEnded`] (or [`FollowerEvent::HostSessionLost`]
//!   when this client was host)
//! - [`FollowerHandle::leave`] cancels the loop before the leave request
//!   goes out, so no pull is issued for a session being left; publishers
//!   made by [`FollowerHandle::publisher`] stop pushing at the same moment

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{
    ClientError, ClientResult, HostPublisher, Identity, PlaybackEngine, PublisherConfig,
    ReconcileStep, Reconciler, SessionApi,
};
use crate::protocol_constants::{
    CONNECTIVITY_WARNING_AFTER_MISSES, DEFAULT_POLL_INTERVAL_MS, DRIFT_THRESHOLD_SECS,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::LeaveOutcome;
use crate::session::{Participant, SyncSnapshot};

/// Pull loop settings.
#[derive(Debug, Clone)]
pub struct FollowerConfig {
    pub poll_interval_ms: u64,
    pub drift_threshold_secs: f64,
    /// Consecutive failed pulls before a connectivity warning.
    pub connectivity_warning_after: u32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drift_threshold_secs: DRIFT_THRESHOLD_SECS,
            connectivity_warning_after: CONNECTIVITY_WARNING_AFTER_MISSES,
        }
    }
}

/// Why a follower stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The session no longer exists.
    Ended,
    /// The session exists but this user is not in its roster.
    Removed,
}

/// Notifications from the pull loop.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowerEvent {
    /// The roster differs from the previous pull.
    RosterChanged(Vec<Participant>),
    /// This client is now host; stop reconciling and start publishing.
    /// Also raised on the first pull when this client already hosts.
    PromotedToHost,
    /// Engine calls made to follow the host.
    Reconciled(Vec<ReconcileStep>),
    ConnectivityWarning { consecutive_misses: u32 },
    ConnectivityRestored,
    /// Terminal for participants.
    SessionEnded { reason: SessionEndReason },
    /// Terminal for the host: its own session disappeared.
    HostSessionLost,
}

#[derive(Default)]
struct SharedState {
    roster: Vec<Participant>,
    is_host: bool,
}

/// Control surface of a running follower.
pub struct FollowerHandle {
    api: Arc<dyn SessionApi>,
    session_id: String,
    user_id: String,
    state: Arc<RwLock<SharedState>>,
    events: mpsc::UnboundedReceiver<FollowerEvent>,
    /// Cancelled on leave. Parent of `cancel`.
    membership: CancellationToken,
    /// Stops the pull loop only.
    cancel: CancellationToken,
}

impl FollowerHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Roster as of the last successful pull.
    pub fn roster(&self) -> Vec<Participant> {
        self.state.read().roster.clone()
    }

    /// Whether the last successful pull showed this client as host.
    pub fn is_host(&self) -> bool {
        self.state.read().is_host
    }

    /// Waits for the next event. `None` once the loop has exited.
    pub async fn next_event(&mut self) -> Option<FollowerEvent> {
        self.events.recv().await
    }

    /// Stops the loop without leaving the session.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A publisher for this client's pushes that goes quiet once
    /// [`leave`](Self::leave) is called.
    pub fn publisher(&self, config: PublisherConfig) -> HostPublisher {
        HostPublisher::new(
            Arc::clone(&self.api),
            self.session_id.clone(),
            self.user_id.clone(),
            config,
        )
        .with_cancel(self.membership.clone())
    }

    /// Stops the loop and any linked publisher, then leaves the session.
    pub async fn leave(self) -> ClientResult<LeaveOutcome> {
        self.membership.cancel();
        log::info!("[Follower] Leaving {}", self.session_id);
        self.api.leave(&self.session_id, &self.user_id).await
    }
}

impl Drop for FollowerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What one pull means for the loop.
enum Tick {
    Continue,
    Stop,
}

/// The pull loop itself.
pub struct SessionFollower {
    api: Arc<dyn SessionApi>,
    engine: Arc<dyn PlaybackEngine>,
    user_id: String,
    session_id: String,
    config: FollowerConfig,
    reconciler: Reconciler,
    state: Arc<RwLock<SharedState>>,
    events: mpsc::UnboundedSender<FollowerEvent>,
    misses: u32,
    warned: bool,
}

impl SessionFollower {
    /// Starts following `session_id` on the current Tokio runtime.
    pub fn spawn(
        api: Arc<dyn SessionApi>,
        engine: Arc<dyn PlaybackEngine>,
        identity: &Identity,
        session_id: &str,
        config: FollowerConfig,
    ) -> FollowerHandle {
        Self::spawn_with(&TokioSpawner::current(), api, engine, identity, session_id, config)
    }

    /// Starts following `session_id` on the given spawner.
    pub fn spawn_with<S: TaskSpawner>(
        spawner: &S,
        api: Arc<dyn SessionApi>,
        engine: Arc<dyn PlaybackEngine>,
        identity: &Identity,
        session_id: &str,
        config: FollowerConfig,
    ) -> FollowerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(SharedState::default()));
        let membership = CancellationToken::new();
        let cancel = membership.child_token();

        let follower = Self {
            api: Arc::clone(&api),
            engine,
            user_id: identity.user_id.clone(),
            session_id: session_id.to_string(),
            reconciler: Reconciler::new(config.drift_threshold_secs),
            config,
            state: Arc::clone(&state),
            events: tx,
            misses: 0,
            warned: false,
        };
        spawner.spawn(follower.run(cancel.clone()));

        FollowerHandle {
            api,
            session_id: session_id.to_string(),
            user_id: identity.user_id.clone(),
            state,
            events: rx,
            membership,
            cancel,
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        log::info!(
            "[Follower] Following {} every {}ms",
            self.session_id,
            interval.as_millis()
        );

        loop {
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                pulled = self.api.snapshot(&self.session_id) => pulled,
            };

            if let Tick::Stop = self.handle_pull(pulled).await {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        log::info!("[Follower] Stopped following {}", self.session_id);
    }

    async fn handle_pull(&mut self, pulled: ClientResult<SyncSnapshot>) -> Tick {
        match pulled {
            Ok(snapshot) => {
                self.mark_reachable();
                self.apply_snapshot(snapshot).await
            }
            Err(err) if err.is_session_gone() => {
                self.end(SessionEndReason::Ended);
                Tick::Stop
            }
            Err(err) if err.is_transient() => {
                self.mark_missed(&err);
                Tick::Continue
            }
            Err(err) => {
                log::warn!("[Follower] Pull of {} rejected: {}", self.session_id, err);
                Tick::Continue
            }
        }
    }

    async fn apply_snapshot(&mut self, snapshot: SyncSnapshot) -> Tick {
        if !snapshot.contains(&self.user_id) {
            self.end(SessionEndReason::Removed);
            return Tick::Stop;
        }

        let now_host = snapshot
            .host()
            .map_or(false, |host| host.id == self.user_id);

        let (roster_changed, promoted) = {
            let mut state = self.state.write();
            let roster_changed = state.roster != snapshot.participants;
            if roster_changed {
                state.roster = snapshot.participants.clone();
            }
            let promoted = now_host && !state.is_host;
            state.is_host = now_host;
            (roster_changed, promoted)
        };

        if roster_changed {
            self.emit(FollowerEvent::RosterChanged(snapshot.participants.clone()));
        }
        if promoted {
            log::info!("[Follower] Now host of {}", self.session_id);
            self.emit(FollowerEvent::PromotedToHost);
        }

        if !now_host {
            match self.reconciler.reconcile(self.engine.as_ref(), &snapshot).await {
                Ok(steps) if !steps.is_empty() => self.emit(FollowerEvent::Reconciled(steps)),
                Ok(_) => {}
                Err(e) => log::warn!("[Follower] Reconcile failed: {}", e),
            }
        }
        Tick::Continue
    }

    fn mark_reachable(&mut self) {
        if self.warned {
            log::info!("[Follower] Connectivity to {} restored", self.session_id);
            self.emit(FollowerEvent::ConnectivityRestored);
        }
        self.misses = 0;
        self.warned = false;
    }

    fn mark_missed(&mut self, err: &ClientError) {
        self.misses = self.misses.saturating_add(1);
        log::debug!(
            "[Follower] Pull {} failed ({} in a row): {}",
            self.session_id,
            self.misses,
            err
        );
        if !self.warned && self.misses >= self.config.connectivity_warning_after {
            self.warned = true;
            log::warn!(
                "[Follower] {} consecutive pulls of {} failed",
                self.misses,
                self.session_id
            );
            self.emit(FollowerEvent::ConnectivityWarning {
                consecutive_misses: self.misses,
            });
        }
    }

    fn end(&mut self, reason: SessionEndReason) {
        let was_host = {
            let mut state = self.state.write();
            let was_host = state.is_host;
            state.roster.clear();
            state.is_host = false;
            was_host
        };

        if was_host && reason == SessionEndReason::Ended {
            log::warn!("[Follower] Own session {} disappeared", self.session_id);
            self.emit(FollowerEvent::HostSessionLost);
        } else {
            log::info!("[Follower] Session {} over: {:?}", self.session_id, reason);
            self.emit(FollowerEvent::SessionEnded { reason });
        }
    }

    fn emit(&self, event: FollowerEvent) {
        // Receiver gone means nobody is listening; the loop still runs.
        let _ = self.events.send(event);
    }
}
