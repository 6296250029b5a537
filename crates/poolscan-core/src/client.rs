//! Node-facing seams: the per-connection query surface and the
//! failover source that produces connections.

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{LogFilter, RawLogEvent, ScanRange};

/// The two node queries the scanner needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch all logs in `range` matching `filter`.
    async fn logs(
        &self,
        range: &ScanRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLogEvent>, ScanError>;

    /// Current chain head block number.
    async fn head_number(&self) -> Result<u64, ScanError>;
}

/// A live node connection, tagged with the reconnect epoch it was
/// created in. Owned by the connection source; the scanner borrows it
/// for one iteration at a time.
pub struct Connection {
    epoch: u64,
    inner: Box<dyn ChainClient>,
}

impl Connection {
    pub fn new(epoch: u64, inner: Box<dyn ChainClient>) -> Self {
        Self { epoch, inner }
    }

    /// Reconnect counter value at the time this connection was dialed.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[async_trait]
impl ChainClient for Connection {
    async fn logs(
        &self,
        range: &ScanRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLogEvent>, ScanError> {
        self.inner.logs(range, filter).await
    }

    async fn head_number(&self) -> Result<u64, ScanError> {
        self.inner.head_number().await
    }
}

/// Produces connections, failing over across endpoints as needed.
///
/// `acquire` blocks until a connection is available and never fails;
/// the production implementation retries the endpoint pool forever with
/// a fixed backoff.
#[async_trait]
pub trait ConnectionSource: Send {
    async fn acquire(&mut self) -> Connection;
}
