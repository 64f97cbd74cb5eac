//! Seam to the local audio pipeline.

use async_trait::async_trait;

use crate::client::ClientResult;
use crate::session::Track;

/// Local playback engine, treated as a black box.
///
/// Only followers (non-hosts) are ever driven through this trait; the host's
/// own playback is the source of truth and is observed, not controlled.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Loads `track` from the start. Playback state after loading is paused.
    async fn load_track(&self, track: &Track) -> ClientResult<()>;

    async fn play(&self) -> ClientResult<()>;

    async fn pause(&self) -> ClientResult<()>;

    /// Moves the playhead to `time` seconds.
    async fn seek(&self, time: f64) -> ClientResult<()>;

    /// Playhead in seconds.
    async fn current_time(&self) -> f64;

    /// Id of the loaded track, if any.
    async fn current_track_id(&self) -> Option<String>;

    async fn is_playing(&self) -> bool;
}
