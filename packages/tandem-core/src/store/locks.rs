//! Per-session critical sections.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutex per session id.
///
/// Every read-modify-write of a session record runs while holding the guard
/// for that id, so concurrent joins, leaves, and pushes against the same
/// session are applied one after another instead of overwriting each other.
/// Different sessions never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is not held across the await.
        let mutex = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drops the entry for `id` if nobody holds or waits on it.
    pub fn release(&self, id: &str) {
        self.locks
            .remove_if(id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Drops every idle entry. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no ids are tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = Arc::new(SessionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("AB12CD").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.lock("AAAAAA").await;
        // Would deadlock if ids shared a mutex.
        let _b = locks.lock("BBBBBB").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn release_keeps_held_entries() {
        let locks = SessionLocks::new();
        let guard = locks.lock("AB12CD").await;

        locks.release("AB12CD");
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.release("AB12CD");
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn prune_removes_only_idle_entries() {
        let locks = SessionLocks::new();
        let _held = locks.lock("HELD01").await;
        drop(locks.lock("IDLE01").await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
    }
}
