//! Client side of the sync protocol.
//!
//! Runs inside each listener's process:
//!
//! - [`SessionApi`] reaches the session service, over HTTP or in-process
//! - [`HostPublisher`] throttles the host's playback pushes
//! - [`Reconciler`] drives the local [`PlaybackEngine`] toward a snapshot
//! - [`SessionFollower`] is the pull loop tying them together

use thiserror::Error;

use crate::error::TandemError;

pub mod api;
pub mod engine;
pub mod follower;
pub mod publisher;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use api::{HttpSessionApi, LocalSessionApi, SessionApi};
pub use engine::PlaybackEngine;
pub use follower::{
    FollowerConfig, FollowerEvent, FollowerHandle, SessionEndReason, SessionFollower,
};
pub use publisher::{HostPublisher, PublisherConfig};
pub use reconciler::{LocalPlayback, ReconcileStep, Reconciler};

/// Who the local user is, as supplied by the identity system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
    pub avatar: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            avatar: None,
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Errors seen by session clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session does not exist (never did, ended, or reclaimed).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A host-only call was made by someone else.
    #[error("Not the host of session {0}")]
    NotHost(String),

    /// The service could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with an error not covered above.
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The local playback engine failed.
    #[error("Playback engine error: {0}")]
    Engine(String),
}

impl ClientError {
    /// True when the error means the session is gone for this caller.
    #[must_use]
    pub fn is_session_gone(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for failures worth retrying on the next tick.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<TandemError> for ClientError {
    fn from(err: TandemError) -> Self {
        match err {
            TandemError::SessionNotFound(id) => Self::NotFound(id),
            TandemError::NotHost { session_id, .. } => Self::NotHost(session_id),
            other => Self::Api {
                status: other.status_code().as_u16(),
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
