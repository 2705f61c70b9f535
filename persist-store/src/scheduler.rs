//! Trailing-edge debounce for snapshot flushes.
//!
//! Mutations only move a deadline; a single background task waits for the
//! deadline to pass without being moved again and then writes once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};

/// Flush counters of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Mutations (plus the initial pass) that armed or re-armed the timer.
    pub scheduled: u64,
    /// Snapshots written successfully.
    pub written: u64,
    /// Snapshot writes the adapter rejected.
    pub failed: u64,
}

pub(crate) struct FlushScheduler {
    debounce: Duration,
    deadline: Mutex<Option<Instant>>,
    wake: Notify,
    scheduled: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl FlushScheduler {
    pub(crate) fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: Mutex::new(None),
            wake: Notify::new(),
            scheduled: AtomicU64::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub(crate) fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Arms the timer, or pushes an armed one back to `now + debounce`.
    pub(crate) fn schedule(&self) {
        *self.deadline() = Some(Instant::now() + self.debounce);
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Disarms the timer. Returns true if a flush was pending.
    pub(crate) fn cancel(&self) -> bool {
        let pending = self.deadline().take().is_some();
        if pending {
            self.wake.notify_one();
        }
        pending
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.deadline().is_some()
    }

    /// Resolves once the current deadline has passed without being moved,
    /// disarming the timer.
    pub(crate) async fn wait_due(&self) {
        loop {
            let current = *self.deadline();
            match current {
                None => self.wake.notified().await,
                Some(due) if Instant::now() >= due => {
                    let mut deadline = self.deadline();
                    // Re-check under the lock: a mutation may have moved it.
                    if *deadline == Some(due) {
                        *deadline = None;
                        return;
                    }
                }
                Some(due) => {
                    tokio::select! {
                        biased;
                        _ = self.wake.notified() => {}
                        _ = sleep_until(due) => {}
                    }
                }
            }
        }
    }

    pub(crate) fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> FlushStats {
        FlushStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn deadline(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
