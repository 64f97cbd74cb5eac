//! Host push / participant pull protocol.
//!
//! The host pushes playback changes; every member pulls a [`SyncSnapshot`]
//! on a fixed interval. Pushes only ever touch the playback fields and
//! `updatedAt`; the roster belongs to the session manager.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::clock::Clock;
use crate::error::{TandemError, TandemResult};
use crate::events::{EventEmitter, PlaybackEvent};
use crate::services::{require_field, session_code, ServiceDeps, StalenessReclaimer};
use crate::session::{Session, SyncSnapshot, Track};
use crate::store::{SessionLocks, SessionStore};

/// A host playback change.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Overwrites `currentTrack`. Resetting the playhead is up to receivers.
    ChangeTrack(Track),
    /// Overwrites `currentTime` (seconds).
    UpdateTime(f64),
    /// Overwrites `isPlaying`.
    PlayPause(bool),
}

impl SyncAction {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeTrack(_) => "change_track",
            Self::UpdateTime(_) => "update_time",
            Self::PlayPause(_) => "play_pause",
        }
    }

    /// Parses an action string and its payload.
    pub fn from_wire(action: &str, payload: Value) -> TandemResult<Self> {
        let parsed = match action {
            "change_track" => {
                let track: Track = serde_json::from_value(payload)
                    .map_err(|e| TandemError::InvalidRequest(format!("change_track: {}", e)))?;
                Self::ChangeTrack(track)
            }
            "update_time" => payload
                .as_f64()
                .map(Self::UpdateTime)
                .ok_or_else(|| TandemError::InvalidRequest("update_time needs a number".into()))?,
            "play_pause" => payload
                .as_bool()
                .map(Self::PlayPause)
                .ok_or_else(|| TandemError::InvalidRequest("play_pause needs a boolean".into()))?,
            other => return Err(TandemError::InvalidAction(other.to_string())),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Payload half of the wire form.
    pub fn payload(&self) -> Value {
        match self {
            Self::ChangeTrack(track) => json!(track),
            Self::UpdateTime(time) => json!(time),
            Self::PlayPause(playing) => json!(playing),
        }
    }

    /// Rejects values no session may hold.
    pub fn validate(&self) -> TandemResult<()> {
        match self {
            Self::ChangeTrack(track) if track.id.trim().is_empty() => Err(
                TandemError::InvalidRequest("change_track needs a track id".into()),
            ),
            Self::UpdateTime(time) if !time.is_finite() || *time < 0.0 => Err(
                TandemError::InvalidRequest(format!("update_time out of range: {}", time)),
            ),
            _ => Ok(()),
        }
    }

    fn apply(&self, session: &mut Session) {
        match self {
            Self::ChangeTrack(track) => session.current_track = Some(track.clone()),
            Self::UpdateTime(time) => session.current_time = *time,
            Self::PlayPause(playing) => session.is_playing = *playing,
        }
    }
}

/// A push request: who is pushing what to which session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPush {
    pub session_id: String,
    pub user_id: String,
    pub action: SyncAction,
}

impl SyncPush {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, action: SyncAction) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            action,
        }
    }

    /// Parses `{sessionId, userId, action, payload}`.
    pub fn from_json(body: &Value) -> TandemResult<Self> {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| TandemError::InvalidRequest(format!("missing {}", name)))
        };
        let session_id = field("sessionId")?;
        let user_id = field("userId")?;
        let action = field("action")?;
        let payload = body.get("payload").cloned().unwrap_or(Value::Null);

        Ok(Self {
            session_id,
            user_id,
            action: SyncAction::from_wire(&action, payload)?,
        })
    }

    /// Wire form, the inverse of [`from_json`](Self::from_json).
    pub fn to_json(&self) -> Value {
        json!({
            "sessionId": self.session_id,
            "userId": self.user_id,
            "action": self.action.name(),
            "payload": self.action.payload(),
        })
    }
}

/// Applies host pushes and serves snapshots.
pub struct SyncEngine {
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    emitter: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
    reclaimer: Arc<StalenessReclaimer>,
}

impl SyncEngine {
    pub fn new(deps: ServiceDeps, reclaimer: Arc<StalenessReclaimer>) -> Self {
        Self {
            store: deps.store,
            locks: deps.locks,
            emitter: deps.emitter,
            clock: deps.clock,
            reclaimer,
        }
    }

    /// Applies a host push and returns the resulting snapshot.
    ///
    /// Pushes from anyone but the current host are rejected with
    /// [`TandemError::NotHost`] and leave the session untouched.
    pub async fn push(&self, push: SyncPush) -> TandemResult<SyncSnapshot> {
        require_field("userId", &push.user_id)?;
        push.action.validate()?;
        let code = session_code(&push.session_id)?;

        let guard = self.locks.lock(&code).await;
        let mut session = self
            .reclaimer
            .load_live_locked(&code)
            .await?
            .ok_or_else(|| TandemError::SessionNotFound(code.clone()))?;

        if !session.is_host(&push.user_id) {
            log::warn!(
                "[SyncEngine] Rejected {} from non-host {} on {}",
                push.action.name(),
                push.user_id,
                code
            );
            return Err(TandemError::NotHost {
                session_id: code,
                user_id: push.user_id,
            });
        }

        let now = self.clock.now_millis();
        push.action.apply(&mut session);
        session.touch(now);
        self.store.set(&code, &session).await?;
        drop(guard);

        log::debug!("[SyncEngine] {} {:?} on {}", push.action.name(), push.action, code);
        let snapshot = session.snapshot();
        self.emitter.emit_playback(PlaybackEvent::Updated {
            session_id: code,
            snapshot: snapshot.clone(),
            timestamp: now,
        });
        Ok(snapshot)
    }

    /// Current playback and roster state of a session.
    pub async fn snapshot(&self, session_id: &str) -> TandemResult<SyncSnapshot> {
        let code = session_code(session_id)?;
        let session = self
            .reclaimer
            .load_live(&code)
            .await?
            .ok_or(TandemError::SessionNotFound(code))?;
        log::trace!("[SyncEngine] Snapshot of {}", session.id);
        Ok(session.snapshot())
    }
}
