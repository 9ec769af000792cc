//! Versioned cancellation for background searches.
//!
//! Starting a new search bumps the active version; every token minted for an
//! older version then reports itself cancelled. Checks are a single relaxed
//! atomic load, so traversal loops can poll between directories.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct SearchVersionTracker {
    active_version: Arc<AtomicU64>,
}

impl SearchVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active version, cancelling every older token.
    pub fn next_version(&self) -> u64 {
        self.active_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_version(&self) -> u64 {
        self.active_version.load(Ordering::SeqCst)
    }

    pub fn token_for_version(&self, version: u64) -> CancellationToken {
        CancellationToken {
            active_version: Some(Arc::clone(&self.active_version)),
            version,
        }
    }

    /// Bumps the version and returns a token for it.
    pub fn next_token(&self) -> CancellationToken {
        let version = self.next_version();
        self.token_for_version(version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    active_version: Option<Arc<AtomicU64>>,
    version: u64,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.active_version {
            Some(active) => active.load(Ordering::Relaxed) != self.version,
            None => false,
        }
    }
}
