//! Single-flight coordination for credential refresh.
//!
//! Any number of requests can hit a 401 in the same instant; exactly one
//! refresh call may go to the backend for that storm. The gate is an async
//! mutex held across the refresh plus a completion epoch: a caller that
//! queued up while a refresh was in flight sees the advanced epoch after
//! acquiring the lock and adopts the stored outcome instead of issuing a
//! duplicate call. The lock is released on settle regardless of outcome,
//! so a later 401 always gets a fresh attempt.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

/// Cloneable summary of a failed refresh, shared by every caller that
/// joined the same attempt (`reqwest::Error` itself is not `Clone`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{detail}")]
pub(crate) struct RefreshError {
    pub(crate) detail: String,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    /// Number of settled refresh attempts.
    epoch: AtomicU64,
    /// Outcome of the most recent attempt; `None` until the first settles.
    last: Mutex<Option<Result<(), RefreshError>>>,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `refresh` unless an attempt is already in flight, in which case
    /// wait for it and adopt its outcome.
    pub(crate) async fn run<F, Fut>(&self, refresh: F) -> Result<(), RefreshError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RefreshError>>,
    {
        let entered = self.epoch.load(Ordering::Acquire);
        let mut last = self.last.lock().await;

        if self.epoch.load(Ordering::Acquire) != entered {
            // An attempt settled while we waited for the lock; that attempt
            // covers our 401 too.
            if let Some(outcome) = last.as_ref() {
                debug!("joining settled credential refresh");
                return outcome.clone();
            }
        }

        let outcome = refresh().await;
        *last = Some(outcome.clone());
        self.epoch.fetch_add(1, Ordering::Release);
        outcome
    }
}
