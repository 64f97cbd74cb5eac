//! Task spawning seam.
//!
//! Background work (the reclaimer sweep, client pull loops) is started
//! through [`TaskSpawner`] so embedders can route it onto their own runtime.

use std::future::Future;

/// Spawns detached background tasks.
///
/// Spawned tasks are not joined. Anything that must stop early is handed a
/// `CancellationToken` by its owner.
pub trait TaskSpawner: Send + Sync {
    /// Spawns `future` and returns immediately.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Spawner backed by a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Wraps an explicit runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the ambient runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
