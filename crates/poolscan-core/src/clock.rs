//! Injectable time source.
//!
//! The scanner's control loop contains long sleeps (head polling,
//! confirmation backoff). Routing them through a trait lets tests drive
//! chain-head progression without real delays.

use std::time::Duration;

use async_trait::async_trait;

/// A source of sleeps for the scanner loop.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// The production clock, backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
