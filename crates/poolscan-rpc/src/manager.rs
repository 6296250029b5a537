//! Connection manager — owns the live node connection and fails over
//! across the endpoint pool.
//!
//! `acquire` never fails: it walks the pool in configured order from a
//! remembered index, sleeping a fixed backoff after each dead endpoint
//! and wrapping to the first when the list is exhausted. This service
//! values availability over fast failure, so there is no retry cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use poolscan_core::{ChainClient, Clock, Connection, ConnectionSource, ScanError, ScannerMetrics, TokioClock};

use crate::client::EthRpcClient;
use crate::endpoint::EndpointPool;

/// Fixed sleep after a failed dial attempt.
pub const DIAL_BACKOFF: Duration = Duration::from_secs(30);

/// Per-request timeout for dial probes and scanner queries.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens a connection to a single endpoint.
///
/// Split out of the manager so failover can be exercised without a
/// network.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, url: &str) -> Result<Box<dyn ChainClient>, ScanError>;
}

/// Production dialer: builds an HTTP client and probes the endpoint
/// with `eth_blockNumber` so a dead node is caught at dial time.
pub struct HttpDialer {
    request_timeout: Duration,
}

impl HttpDialer {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpDialer {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl Dialer for HttpDialer {
    async fn dial(&self, url: &str) -> Result<Box<dyn ChainClient>, ScanError> {
        let client = EthRpcClient::new(url, self.request_timeout)?;
        let head = client.head_number().await?;
        info!(url, head, "endpoint reachable");
        Ok(Box::new(client))
    }
}

/// Fails over across the endpoint pool; implements the core's
/// [`ConnectionSource`] seam.
pub struct ConnectionManager {
    pool: EndpointPool,
    dialer: Box<dyn Dialer>,
    metrics: Arc<ScannerMetrics>,
    clock: Box<dyn Clock>,
    backoff: Duration,
    /// Remembered pool index; the next acquire starts here.
    index: usize,
    /// Incremented on every successful (re)connect.
    epoch: u64,
}

impl ConnectionManager {
    pub fn new(pool: EndpointPool, metrics: Arc<ScannerMetrics>) -> Self {
        Self::with_dialer(pool, metrics, Box::new(HttpDialer::default()), Box::new(TokioClock))
    }

    pub fn with_dialer(
        pool: EndpointPool,
        metrics: Arc<ScannerMetrics>,
        dialer: Box<dyn Dialer>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            dialer,
            metrics,
            clock,
            backoff: DIAL_BACKOFF,
            index: 0,
            epoch: 0,
        }
    }
}

#[async_trait]
impl ConnectionSource for ConnectionManager {
    async fn acquire(&mut self) -> Connection {
        loop {
            let endpoint = self.pool.get(self.index);
            info!(url = endpoint.url(), position = endpoint.position(), "dialing endpoint");
            match self.dialer.dial(endpoint.url()).await {
                Ok(client) => {
                    self.epoch += 1;
                    info!(url = endpoint.url(), epoch = self.epoch, "connected");
                    return Connection::new(self.epoch, client);
                }
                Err(e) => {
                    warn!(url = endpoint.url(), error = %e, "dial failed");
                    self.metrics.record_reconnect();
                    self.clock.sleep(self.backoff).await;
                    self.index = self.pool.next_index(self.index);
                }
            }
        }
    }
}
