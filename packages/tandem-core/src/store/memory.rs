//! In-process session store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SessionStore, StoreResult};
use crate::session::Session;

/// Session store backed by a concurrent in-process map.
///
/// Each operation is atomic per entry. Contents are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.get(id).map(|r| r.value().clone()))
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        self.sessions.insert(id.to_string(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<Session>> {
        Ok(self.sessions.iter().map(|r| r.value().clone()).collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
