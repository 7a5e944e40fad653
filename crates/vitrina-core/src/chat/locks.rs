//! Per-session turn serialization.
//!
//! Concurrent turns against the same session would interleave message
//! seqs and clobber each other's state merges, so each session gets a
//! mutex and a turn holds it end to end. Different sessions proceed in
//! parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lock arena keyed by session id. Entries are created lazily and kept
/// for the process lifetime; a `()` mutex per seen session is cheap.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one session, waiting if a turn is in flight.
    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
