//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{PlaybackEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a session lifecycle or roster event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a host playback event.
    fn emit_playback(&self, event: PlaybackEvent);
}

/// No-op emitter for embedding or testing.
///
/// Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_playback(&self, _event: PlaybackEvent) {}
}

/// Test emitter that records every event in order.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingEventEmitter {
    pub sessions: parking_lot::Mutex<Vec<SessionEvent>>,
    pub playback: parking_lot::Mutex<Vec<PlaybackEvent>>,
}

#[cfg(test)]
impl RecordingEventEmitter {
    pub fn session_events(&self) -> Vec<SessionEvent> {
        self.sessions.lock().clone()
    }

    pub fn playback_events(&self) -> Vec<PlaybackEvent> {
        self.playback.lock().clone()
    }
}

#[cfg(test)]
impl EventEmitter for RecordingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        self.sessions.lock().push(event);
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        self.playback.lock().push(event);
    }
}
