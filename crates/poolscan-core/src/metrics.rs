//! Process-wide scanner metrics.
//!
//! A single `ScannerMetrics` is constructed in `main` and shared by `Arc`
//! between the connection manager, the scanner, and the exposition
//! endpoint. Counters are plain atomics: the scanner writes from its one
//! loop, readers take a lock-free snapshot, and eventual consistency is
//! all the exposition surface needs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters and gauges updated by the scanning activity.
#[derive(Debug, Default)]
pub struct ScannerMetrics {
    /// Total reconnect attempts across all endpoints.
    reconnects_total: AtomicU64,
    /// Highest block number fully scanned and committed.
    last_committed_block: AtomicU64,
}

/// A point-in-time copy of every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reconnects_total: u64,
    pub last_committed_block: u64,
}

impl ScannerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failed dial attempt.
    pub fn record_reconnect(&self) {
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the newest committed checkpoint value.
    pub fn set_last_committed_block(&self, block: u64) {
        self.last_committed_block.store(block, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconnects_total: self.reconnects_total.load(Ordering::Relaxed),
            last_committed_block: self.last_committed_block.load(Ordering::Relaxed),
        }
    }

    /// Render all metrics as plaintext `name value` lines.
    pub fn render_text(&self) -> String {
        let snap = self.snapshot();
        format!(
            "scanner_reconnects_total {}\nscanner_last_committed_block {}\n",
            snap.reconnects_total, snap.last_committed_block
        )
    }
}
