//! Event system for real-time session notifications.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for the server-sent events transport
//! - Event types for session lifecycle and playback changes
//!
//! Polling the sync snapshot remains the primary protocol; these events are
//! an optional lower-latency path for clients that subscribe.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
#[cfg(test)]
pub(crate) use emitter::RecordingEventEmitter;
pub use emitter::{EventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::session::{Participant, SyncSnapshot};

/// Events broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Session lifecycle and roster events.
    Session(SessionEvent),

    /// Host playback changes.
    Playback(PlaybackEvent),
}

impl BroadcastEvent {
    /// Session code the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Session(event) => event.session_id(),
            Self::Playback(event) => event.session_id(),
        }
    }
}

/// Why a session stopped existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The last participant left.
    LastParticipantLeft,
    /// Deleted by the staleness reclaimer.
    Reclaimed,
}

/// Events related to session lifecycle and roster changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A new session was created.
    Created {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "hostId")]
        host_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A participant joined.
    ParticipantJoined {
        #[serde(rename = "sessionId")]
        session_id: String,
        participant: Participant,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A participant left.
    ParticipantLeft {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Host authority moved to another participant.
    HostChanged {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "previousHostId")]
        previous_host_id: String,
        #[serde(rename = "newHostId")]
        new_host_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session was deleted.
    Ended {
        #[serde(rename = "sessionId")]
        session_id: String,
        reason: EndReason,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl SessionEvent {
    /// Session code the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Created { session_id, .. }
            | Self::ParticipantJoined { session_id, .. }
            | Self::ParticipantLeft { session_id, .. }
            | Self::HostChanged { session_id, .. }
            | Self::Ended { session_id, .. } => session_id,
        }
    }
}

/// Events related to host playback pushes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// The host pushed a playback change; carries the resulting snapshot.
    Updated {
        #[serde(rename = "sessionId")]
        session_id: String,
        snapshot: SyncSnapshot,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl PlaybackEvent {
    /// Session code the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Updated { session_id, .. } => session_id,
        }
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}
