use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of a running consumer.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    applied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    resubscriptions: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    /// Events read from the change feed, relevant or not.
    pub received: u64,
    /// Deadline writes that reached a record.
    pub applied: u64,
    /// Events that needed no write.
    pub skipped: u64,
    /// Deadline writes that failed or found no record.
    pub failed: u64,
    /// Times the feed was reopened after an interruption.
    pub resubscriptions: u64,
}

impl ConsumerStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resubscription(&self) {
        self.resubscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            resubscriptions: self.resubscriptions.load(Ordering::Relaxed),
        }
    }
}

impl ConsumerStatsSnapshot {
    /// Events whose processing has finished.
    pub fn processed(&self) -> u64 {
        self.applied + self.skipped + self.failed
    }
}
