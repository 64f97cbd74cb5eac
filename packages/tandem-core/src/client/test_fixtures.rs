//! Shared mocks for client tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{ClientError, ClientResult, Identity, PlaybackEngine, SessionApi};
use crate::services::{LeaveOutcome, SyncPush};
use crate::session::{Session, SyncSnapshot, Track};

/// A call made against [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load(String),
    Play,
    Pause,
    Seek(f64),
}

#[derive(Default)]
struct MockState {
    track_id: Option<String>,
    playing: bool,
    time: f64,
}

/// Playback engine that records calls and keeps minimal state.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
    calls: Mutex<Vec<EngineCall>>,
}

impl MockEngine {
    /// Engine already playing `track_id` at `time`.
    pub fn playing(track_id: &str, time: f64) -> Self {
        let engine = Self::default();
        {
            let mut state = engine.state.lock();
            state.track_id = Some(track_id.to_string());
            state.playing = true;
            state.time = time;
        }
        engine
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn set_time(&self, time: f64) {
        self.state.lock().time = time;
    }
}

#[async_trait]
impl PlaybackEngine for MockEngine {
    async fn load_track(&self, track: &Track) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.track_id = Some(track.id.clone());
        state.playing = false;
        state.time = 0.0;
        self.calls.lock().push(EngineCall::Load(track.id.clone()));
        Ok(())
    }

    async fn play(&self) -> ClientResult<()> {
        self.state.lock().playing = true;
        self.calls.lock().push(EngineCall::Play);
        Ok(())
    }

    async fn pause(&self) -> ClientResult<()> {
        self.state.lock().playing = false;
        self.calls.lock().push(EngineCall::Pause);
        Ok(())
    }

    async fn seek(&self, time: f64) -> ClientResult<()> {
        self.state.lock().time = time;
        self.calls.lock().push(EngineCall::Seek(time));
        Ok(())
    }

    async fn current_time(&self) -> f64 {
        self.state.lock().time
    }

    async fn current_track_id(&self) -> Option<String> {
        self.state.lock().track_id.clone()
    }

    async fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

/// Wraps a real API, counting calls and optionally failing them.
pub struct FlakyApi {
    inner: Arc<dyn SessionApi>,
    offline: AtomicBool,
    rejecting: AtomicBool,
    pub snapshot_calls: AtomicUsize,
    pub pushes: Mutex<Vec<SyncPush>>,
    pub leaves: AtomicUsize,
}

impl FlakyApi {
    pub fn new(inner: Arc<dyn SessionApi>) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            rejecting: AtomicBool::new(false),
            snapshot_calls: AtomicUsize::new(0),
            pushes: Mutex::new(Vec::new()),
            leaves: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answers every call with a 400 from a reachable server.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> ClientResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 400,
                code: "invalid_request".into(),
                message: "rejected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SessionApi for FlakyApi {
    async fn create(&self, identity: &Identity) -> ClientResult<Session> {
        self.check_online()?;
        self.inner.create(identity).await
    }

    async fn join(&self, session_id: &str, identity: &Identity) -> ClientResult<Session> {
        self.check_online()?;
        self.inner.join(session_id, identity).await
    }

    async fn leave(&self, session_id: &str, user_id: &str) -> ClientResult<LeaveOutcome> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.inner.leave(session_id, user_id).await
    }

    async fn get_session(&self, session_id: &str) -> ClientResult<Session> {
        self.check_online()?;
        self.inner.get_session(session_id).await
    }

    async fn snapshot(&self, session_id: &str) -> ClientResult<SyncSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.inner.snapshot(session_id).await
    }

    async fn push(&self, push: SyncPush) -> ClientResult<()> {
        self.check_online()?;
        self.pushes.lock().push(push.clone());
        self.inner.push(push).await
    }
}
