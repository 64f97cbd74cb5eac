//! Client access to the session service.
//!
//! [`SessionApi`] is the seam the follower and publisher talk through.
//! [`HttpSessionApi`] speaks the JSON contract of the HTTP server;
//! [`LocalSessionApi`] calls the services directly for embedded use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::client::{ClientError, ClientResult, Identity};
use crate::protocol_constants::API_TIMEOUT_SECS;
use crate::services::{LeaveOutcome, SessionManager, SessionReply, SyncEngine, SyncPush};
use crate::session::{Session, SyncSnapshot};

/// Session operations a client can issue.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create(&self, identity: &Identity) -> ClientResult<Session>;

    async fn join(&self, session_id: &str, identity: &Identity) -> ClientResult<Session>;

    async fn leave(&self, session_id: &str, user_id: &str) -> ClientResult<LeaveOutcome>;

    async fn get_session(&self, session_id: &str) -> ClientResult<Session>;

    async fn snapshot(&self, session_id: &str) -> ClientResult<SyncSnapshot>;

    async fn push(&self, push: SyncPush) -> ClientResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Error body produced by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// [`SessionApi`] over the server's HTTP endpoints.
pub struct HttpSessionApi {
    client: Client,
    base_url: Url,
}

impl HttpSessionApi {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] for an unusable URL or if the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Creates a client sharing an existing `reqwest::Client`.
    pub fn with_client(client: Client, base_url: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Transport(format!(
                "base URL cannot carry a path: {}",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Appends path segments (percent-encoded) to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn decode<T: DeserializeOwned>(response: Response, session_id: &str) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error: String::new(),
            message: String::new(),
        });
        Err(match body.error.as_str() {
            "session_not_found" => ClientError::NotFound(session_id.to_string()),
            "not_host" => ClientError::NotHost(session_id.to_string()),
            _ => ClientError::Api {
                status: status.as_u16(),
                code: body.error,
                message: body.message,
            },
        })
    }

    async fn post_action(&self, body: serde_json::Value, session_id: &str) -> ClientResult<SessionReply> {
        let response = self
            .client
            .post(self.endpoint(&["api", "sessions"]))
            .json(&body)
            .send()
            .await?;
        Self::decode(response, session_id).await
    }
}

fn expect_session(reply: SessionReply, session_id: &str) -> ClientResult<Session> {
    match reply {
        SessionReply::Session(session) => Ok(*session),
        SessionReply::Ended { .. } => Err(ClientError::NotFound(session_id.to_string())),
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create(&self, identity: &Identity) -> ClientResult<Session> {
        let body = serde_json::json!({
            "action": "create",
            "userId": identity.user_id,
            "userName": identity.user_name,
        });
        let reply = self.post_action(body, "").await?;
        expect_session(reply, "")
    }

    async fn join(&self, session_id: &str, identity: &Identity) -> ClientResult<Session> {
        let body = serde_json::json!({
            "action": "join",
            "sessionId": session_id,
            "userId": identity.user_id,
            "userName": identity.user_name,
            "avatar": identity.avatar,
        });
        let reply = self.post_action(body, session_id).await?;
        expect_session(reply, session_id)
    }

    async fn leave(&self, session_id: &str, user_id: &str) -> ClientResult<LeaveOutcome> {
        let body = serde_json::json!({
            "action": "leave",
            "sessionId": session_id,
            "userId": user_id,
        });
        Ok(match self.post_action(body, session_id).await? {
            SessionReply::Session(session) => LeaveOutcome::Left(*session),
            SessionReply::Ended { .. } => LeaveOutcome::Ended,
        })
    }

    async fn get_session(&self, session_id: &str) -> ClientResult<Session> {
        let response = self
            .client
            .get(self.endpoint(&["api", "sessions", session_id]))
            .send()
            .await?;
        Self::decode(response, session_id).await
    }

    async fn snapshot(&self, session_id: &str) -> ClientResult<SyncSnapshot> {
        let response = self
            .client
            .get(self.endpoint(&["api", "sync", session_id]))
            .send()
            .await?;
        Self::decode(response, session_id).await
    }

    async fn push(&self, push: SyncPush) -> ClientResult<()> {
        let response = self
            .client
            .post(self.endpoint(&["api", "sync"]))
            .json(&push.to_json())
            .send()
            .await?;
        let _: serde_json::Value = Self::decode(response, &push.session_id).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process
// ─────────────────────────────────────────────────────────────────────────────

/// [`SessionApi`] calling the services in the same process.
#[derive(Clone)]
pub struct LocalSessionApi {
    manager: Arc<SessionManager>,
    engine: Arc<SyncEngine>,
}

impl LocalSessionApi {
    pub fn new(manager: Arc<SessionManager>, engine: Arc<SyncEngine>) -> Self {
        Self { manager, engine }
    }
}

#[async_trait]
impl SessionApi for LocalSessionApi {
    async fn create(&self, identity: &Identity) -> ClientResult<Session> {
        Ok(self
            .manager
            .create_session(&identity.user_id, &identity.user_name)
            .await?)
    }

    async fn join(&self, session_id: &str, identity: &Identity) -> ClientResult<Session> {
        Ok(self
            .manager
            .join_session(
                session_id,
                &identity.user_id,
                &identity.user_name,
                identity.avatar.clone(),
            )
            .await?)
    }

    async fn leave(&self, session_id: &str, user_id: &str) -> ClientResult<LeaveOutcome> {
        Ok(self.manager.leave_session(session_id, user_id).await?)
    }

    async fn get_session(&self, session_id: &str) -> ClientResult<Session> {
        Ok(self.manager.get_session(session_id).await?)
    }

    async fn snapshot(&self, session_id: &str) -> ClientResult<SyncSnapshot> {
        Ok(self.engine.snapshot(session_id).await?)
    }

    async fn push(&self, push: SyncPush) -> ClientResult<()> {
        self.engine.push(push).await?;
        Ok(())
    }
}
