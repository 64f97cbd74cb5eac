//! Host-side push throttling.
//!
//! The host's player reports every local tick; only a fraction of them
//! become pushes:
//!
//! - track changes only when the track id differs from the last one pushed
//! - time updates at most once per `min_time_push_interval_ms`
//! - play state only on a transition

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientResult, SessionApi};
use crate::protocol_constants::MIN_TIME_PUSH_INTERVAL_MS;
use crate::services::{SyncAction, SyncPush};
use crate::session::Track;

/// Throttle settings for [`HostPublisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Minimum gap between two `update_time` pushes.
    pub min_time_push_interval_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            min_time_push_interval_ms: MIN_TIME_PUSH_INTERVAL_MS,
        }
    }
}

#[derive(Default)]
struct Throttle {
    last_track_id: Option<String>,
    last_time_push: Option<Instant>,
    last_playing: Option<bool>,
}

/// Turns host playback observations into throttled pushes.
pub struct HostPublisher {
    api: Arc<dyn SessionApi>,
    session_id: String,
    user_id: String,
    min_time_gap: Duration,
    throttle: Mutex<Throttle>,
    cancel: CancellationToken,
}

impl HostPublisher {
    pub fn new(
        api: Arc<dyn SessionApi>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            api,
            session_id: session_id.into(),
            user_id: user_id.into(),
            min_time_gap: Duration::from_millis(config.min_time_push_interval_ms),
            throttle: Mutex::new(Throttle::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops all pushes once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn stopped(&self) -> bool {
        if self.cancel.is_cancelled() {
            log::debug!("[Publisher] Left {}; dropping report", self.session_id);
            return true;
        }
        false
    }

    /// Forgets what was pushed so the next observations all go out.
    ///
    /// Called when this client is promoted to host mid-session.
    pub fn reset(&self) {
        *self.throttle.lock() = Throttle::default();
    }

    /// Reports the host's active track. Returns whether a push was sent.
    pub async fn on_track(&self, track: &Track) -> ClientResult<bool> {
        if self.stopped() || self.throttle.lock().last_track_id.as_deref() == Some(track.id.as_str()) {
            return Ok(false);
        }

        self.send(SyncAction::ChangeTrack(track.clone())).await?;
        self.throttle.lock().last_track_id = Some(track.id.clone());
        log::debug!("[Publisher] Track {} pushed to {}", track.id, self.session_id);
        Ok(true)
    }

    /// Reports the host's playhead. Returns whether a push was sent.
    pub async fn on_time(&self, time: f64) -> ClientResult<bool> {
        if self.stopped() {
            return Ok(false);
        }
        let now = Instant::now();
        let due = self
            .throttle
            .lock()
            .last_time_push
            .map_or(true, |last| now.duration_since(last) >= self.min_time_gap);
        if !due {
            return Ok(false);
        }

        self.send(SyncAction::UpdateTime(time)).await?;
        self.throttle.lock().last_time_push = Some(now);
        log::trace!("[Publisher] Time {:.2}s pushed to {}", time, self.session_id);
        Ok(true)
    }

    /// Reports the host's play/pause state. Returns whether a push was sent.
    pub async fn on_play_state(&self, playing: bool) -> ClientResult<bool> {
        if self.stopped() || self.throttle.lock().last_playing == Some(playing) {
            return Ok(false);
        }

        self.send(SyncAction::PlayPause(playing)).await?;
        self.throttle.lock().last_playing = Some(playing);
        log::debug!(
            "[Publisher] {} pushed to {}",
            if playing { "Play" } else { "Pause" },
            self.session_id
        );
        Ok(true)
    }

    async fn send(&self, action: SyncAction) -> ClientResult<()> {
        self.api
            .push(SyncPush::new(&self.session_id, &self.user_id, action))
            .await
    }
}
