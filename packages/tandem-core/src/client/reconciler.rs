//! Drives a follower's playback engine toward the host's snapshot.
//!
//! [`Reconciler::plan`] is pure: it compares a snapshot with the local state
//! and lists the engine calls needed. [`Reconciler::apply`] performs them.

use crate::client::{ClientResult, PlaybackEngine};
use crate::protocol_constants::DRIFT_THRESHOLD_SECS;
use crate::session::{SyncSnapshot, Track};

/// What the local engine is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayback {
    pub track_id: Option<String>,
    pub is_playing: bool,
    pub current_time: f64,
}

impl LocalPlayback {
    /// Reads the engine's state.
    pub async fn read(engine: &dyn PlaybackEngine) -> Self {
        Self {
            track_id: engine.current_track_id().await,
            is_playing: engine.is_playing().await,
            current_time: engine.current_time().await,
        }
    }
}

/// One engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileStep {
    SwitchTrack(Track),
    Seek(f64),
    Play,
    Pause,
}

/// Local reconciliation policy.
#[derive(Debug, Clone)]
pub struct Reconciler {
    drift_threshold: f64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DRIFT_THRESHOLD_SECS)
    }
}

impl Reconciler {
    /// `drift_threshold` is in seconds; deltas at or below it never seek.
    pub fn new(drift_threshold: f64) -> Self {
        Self { drift_threshold }
    }

    pub fn drift_threshold(&self) -> f64 {
        self.drift_threshold
    }

    /// Steps that bring `local` in line with `snapshot`, in application order.
    ///
    /// A track switch leaves the engine paused at 0, so the seek and
    /// play decisions that follow are made against that state.
    pub fn plan(&self, snapshot: &SyncSnapshot, local: &LocalPlayback) -> Vec<ReconcileStep> {
        let mut steps = Vec::new();

        let Some(track) = &snapshot.current_track else {
            // Nothing to play yet; only honour a pause.
            if local.is_playing && !snapshot.is_playing {
                steps.push(ReconcileStep::Pause);
            }
            return steps;
        };

        let mut local_time = local.current_time;
        let mut local_playing = local.is_playing;

        if local.track_id.as_deref() != Some(track.id.as_str()) {
            steps.push(ReconcileStep::SwitchTrack(track.clone()));
            local_time = 0.0;
            local_playing = false;
        }

        if (local_time - snapshot.current_time).abs() > self.drift_threshold {
            steps.push(ReconcileStep::Seek(snapshot.current_time));
        }

        match (snapshot.is_playing, local_playing) {
            (true, false) => steps.push(ReconcileStep::Play),
            (false, true) => steps.push(ReconcileStep::Pause),
            _ => {}
        }

        steps
    }

    /// Performs `steps` against the engine, stopping at the first failure.
    pub async fn apply(&self, engine: &dyn PlaybackEngine, steps: &[ReconcileStep]) -> ClientResult<()> {
        for step in steps {
            match step {
                ReconcileStep::SwitchTrack(track) => engine.load_track(track).await?,
                ReconcileStep::Seek(time) => engine.seek(*time).await?,
                ReconcileStep::Play => engine.play().await?,
                ReconcileStep::Pause => engine.pause().await?,
            }
        }
        Ok(())
    }

    /// Reads, plans and applies in one go. Returns the applied steps.
    pub async fn reconcile(
        &self,
        engine: &dyn PlaybackEngine,
        snapshot: &SyncSnapshot,
    ) -> ClientResult<Vec<ReconcileStep>> {
        let local = LocalPlayback::read(engine).await;
        let steps = self.plan(snapshot, &local);
        if !steps.is_empty() {
            log::debug!("[Follower] Reconciling: {:?}", steps);
            self.apply(engine, &steps).await?;
        }
        Ok(steps)
    }
}
