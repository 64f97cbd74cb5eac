//! Durable session store over an HTTP key-value API.
//!
//! Speaks the Upstash-style REST dialect:
//!
//! | operation | request |
//! |---|---|
//! | get | `GET {base}/get/{key}` |
//! | set | `POST {base}/set/{key}` with the value as raw body |
//! | delete | `POST {base}/del/{key}` |
//! | keys | `GET {base}/keys/{pattern}` |
//! | ping | `GET {base}/ping` |
//!
//! Every reply is `{"result": ...}` on success or `{"error": "..."}` on
//! failure. Sessions are stored as JSON strings under
//! `tandem:session:{CODE}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{SessionStore, StoreError, StoreResult};
use crate::protocol_constants::{STORE_KEY_PREFIX, STORE_TIMEOUT_SECS};
use crate::session::Session;

/// Reply envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Session store backed by an external HTTP key-value service.
pub struct HttpKvSessionStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpKvSessionStore {
    /// Creates a store with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, token: impl Into<String>) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(STORE_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Creates a store that shares an existing HTTP client.
    pub fn with_client(client: Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Checks that the backend is reachable and accepts our token.
    pub async fn ping(&self) -> StoreResult<()> {
        let url = format!("{}/ping", self.base_url);
        self.execute(self.client.get(url)).await.map(|_| ())
    }

    fn key(id: &str) -> String {
        format!("{}{}", STORE_KEY_PREFIX, id)
    }

    /// Sends a request and unwraps the `result` field of the reply.
    async fn execute(&self, request: reqwest::RequestBuilder) -> StoreResult<Value> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::HttpStatus(status.as_u16(), body));
        }

        let reply: KvReply =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        if let Some(error) = reply.error {
            return Err(StoreError::Backend(error));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn decode_session(value: Value) -> StoreResult<Option<Session>> {
        match value {
            Value::Null => Ok(None),
            Value::String(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            // Some gateways hand back already-parsed JSON.
            other @ Value::Object(_) => serde_json::from_value(other)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            other => Err(StoreError::Decode(format!(
                "unexpected value type: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for HttpKvSessionStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Session>> {
        let url = format!("{}/get/{}", self.base_url, Self::key(id));
        let value = self.execute(self.client.get(url)).await?;
        Self::decode_session(value)
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        let body = serde_json::to_string(session).map_err(|e| StoreError::Encode(e.to_string()))?;
        let url = format!("{}/set/{}", self.base_url, Self::key(id));
        self.execute(self.client.post(url).body(body)).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let url = format!("{}/del/{}", self.base_url, Self::key(id));
        self.execute(self.client.post(url)).await?;
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<Session>> {
        let url = format!("{}/keys/{}*", self.base_url, STORE_KEY_PREFIX);
        let keys: Vec<String> = match self.execute(self.client.get(url)).await? {
            Value::Null => Vec::new(),
            value => {
                serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))?
            }
        };

        let ids: Vec<&str> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(STORE_KEY_PREFIX))
            .collect();

        let fetched = join_all(ids.iter().map(|id| self.get(id))).await;

        let mut sessions = Vec::with_capacity(fetched.len());
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(Some(session)) => sessions.push(session),
                // Deleted between KEYS and GET.
                Ok(None) => {}
                Err(StoreError::Decode(e)) => {
                    log::warn!("[Store] Skipping undecodable session {}: {}", id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sessions)
    }

    fn backend_name(&self) -> &'static str {
        "http-kv"
    }
}
