//! Session persistence.
//!
//! Services depend on the [`SessionStore`] trait; the concrete backend is
//! chosen once at startup in [`crate::bootstrap`]:
//!
//! - [`HttpKvSessionStore`]: durable external key-value backend over HTTP
//! - [`MemorySessionStore`]: in-process map for local/dev or when the
//!   durable backend is unavailable
//!
//! Both backends behave identically from the caller's perspective. Neither
//! offers multi-key transactions; read-modify-write sequences are serialized
//! per session id by [`SessionLocks`].

use async_trait::async_trait;
use thiserror::Error;

use crate::session::Session;

mod http_kv;
mod locks;
mod memory;

pub use http_kv::HttpKvSessionStore;
pub use locks::SessionLocks;
pub use memory::MemorySessionStore;

/// Errors raised by session store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the backend.
    #[error("Store request failed: {0}")]
    Http(String),

    /// Backend answered with a non-success HTTP status.
    #[error("Store returned HTTP {0}: {1}")]
    HttpStatus(u16, String),

    /// Backend answered with an error payload.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Stored value could not be decoded into a session.
    #[error("Failed to decode stored session: {0}")]
    Decode(String),

    /// Session could not be encoded for storage.
    #[error("Failed to encode session: {0}")]
    Encode(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence abstraction over session records, keyed by session code.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetches a session, or `None` if the code is not stored.
    async fn get(&self, id: &str) -> StoreResult<Option<Session>>;

    /// Inserts or replaces the full session record.
    async fn set(&self, id: &str, session: &Session) -> StoreResult<()>;

    /// Deletes a session. Deleting an absent code is not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Returns every stored session, in no particular order.
    async fn list_all(&self) -> StoreResult<Vec<Session>>;

    /// Short backend name for logs and the health endpoint.
    fn backend_name(&self) -> &'static str;
}
