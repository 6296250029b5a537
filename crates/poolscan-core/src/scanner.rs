//! The range scanner — a single-threaded control loop that keeps the
//! mirror current.
//!
//! Each iteration walks `Idle → AwaitingConfirmation → Querying →
//! Decoding → Persisting → Idle` over one half-open block range:
//!
//! 1. Wait until the whole range is at least `confirmation_delay`
//!    blocks behind the chain head (reorg-safety margin).
//! 2. Fetch logs for the range; on failure, fail over to another
//!    endpoint and retry the *same* bounds — nothing has been committed
//!    yet, and inserts are idempotent anyway.
//! 3. Demultiplex logs through the event registry.
//! 4. Idempotently persist every decoded record, then advance the
//!    checkpoint (monotonic guard lives in the store).
//!
//! Transient RPC failures never terminate the loop. Integrity failures
//! (malformed payload on a matched signature, missing bootstrap
//! checkpoint, storage errors) abort it: continuing would silently drop
//! data that cannot be recovered without an operator.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::client::{ChainClient, Connection, ConnectionSource};
use crate::clock::Clock;
use crate::error::ScanError;
use crate::metrics::ScannerMetrics;
use crate::registry::EventRegistry;
use crate::store::{InsertOutcome, RecordStore};
use crate::types::{LogFilter, ScanRange};

/// Phase of the scan loop, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    AwaitingConfirmation,
    Querying,
    Decoding,
    Persisting,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingConfirmation => write!(f, "awaiting-confirmation"),
            Self::Querying => write!(f, "querying"),
            Self::Decoding => write!(f, "decoding"),
            Self::Persisting => write!(f, "persisting"),
        }
    }
}

/// What to do when a matched log fails to decode.
///
/// Halting is the safe default (an ABI mismatch will not heal by
/// retrying), but operators who prefer degraded operation over an
/// outage can skip the log and alert on it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Abort the scanning activity.
    #[default]
    Fatal,
    /// Log at error level and continue with the rest of the range.
    SkipAndLog,
}

impl std::str::FromStr for DecodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "skip" => Ok(Self::SkipAndLog),
            other => Err(format!("unknown decode failure policy: {other}")),
        }
    }
}

/// Scanner tuning knobs.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Blocks per scan iteration.
    pub range_width: u64,
    /// Most-recent blocks never scanned, as a reorg margin.
    pub confirmation_delay: u64,
    /// Sleep before each head poll.
    pub head_poll_interval: Duration,
    /// Extra sleep when the head has not cleared the margin yet.
    pub confirmation_backoff: Duration,
    /// Policy for malformed payloads on matched signatures.
    pub decode_failure_policy: DecodeFailurePolicy,
    /// Stop (successfully) once the cursor reaches this block.
    /// `None` = run until process exit.
    pub stop_at: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            range_width: 50,
            confirmation_delay: 50,
            head_poll_interval: Duration::from_secs(5),
            confirmation_backoff: Duration::from_secs(120),
            decode_failure_policy: DecodeFailurePolicy::Fatal,
            stop_at: None,
        }
    }
}

/// The scanning activity. One per process; strictly sequential inside.
pub struct RangeScanner {
    config: ScannerConfig,
    source: Box<dyn ConnectionSource>,
    registry: EventRegistry,
    filter: LogFilter,
    records: Arc<dyn RecordStore>,
    checkpoint: Arc<dyn CheckpointStore>,
    metrics: Arc<ScannerMetrics>,
    clock: Box<dyn Clock>,
    state: ScanState,
}

impl RangeScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScannerConfig,
        source: Box<dyn ConnectionSource>,
        registry: EventRegistry,
        records: Arc<dyn RecordStore>,
        checkpoint: Arc<dyn CheckpointStore>,
        metrics: Arc<ScannerMetrics>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let filter = registry.filter();
        Self {
            config,
            source,
            registry,
            filter,
            records,
            checkpoint,
            metrics,
            clock,
            state: ScanState::Idle,
        }
    }

    /// Current loop phase.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Run the scan loop.
    ///
    /// Returns `Ok(())` only when `stop_at` is configured and reached;
    /// otherwise loops until an integrity failure.
    pub async fn run(&mut self) -> Result<(), ScanError> {
        let mut cursor = self
            .checkpoint
            .load()
            .await?
            .ok_or(ScanError::MissingCheckpoint)?;
        info!(cursor, watched = self.registry.len(), "scanner started");

        let mut conn = self.source.acquire().await;

        loop {
            if let Some(stop) = self.config.stop_at {
                if cursor >= stop {
                    info!(cursor, "stop block reached");
                    self.state = ScanState::Idle;
                    return Ok(());
                }
            }

            let range = ScanRange::open(cursor, self.config.range_width);

            self.state = ScanState::AwaitingConfirmation;
            self.await_confirmation(&mut conn, &range).await;

            self.state = ScanState::Querying;
            let logs = self.query_range(&mut conn, &range).await;

            self.state = ScanState::Decoding;
            let records = self.decode_batch(&logs)?;

            self.state = ScanState::Persisting;
            let mut inserted = 0usize;
            for record in &records {
                if let InsertOutcome::Inserted = self.records.insert_if_absent(record).await? {
                    inserted += 1;
                }
            }

            self.checkpoint.advance(range.end).await?;
            self.metrics.set_last_committed_block(range.end);
            info!(
                range = %range,
                logs = logs.len(),
                records = records.len(),
                inserted,
                "range committed"
            );

            cursor = range.end;
            self.state = ScanState::Idle;
        }
    }

    /// Block until every block in `range` is `confirmation_delay` behind
    /// the chain head. Head-query failures fail over and keep polling.
    async fn await_confirmation(&mut self, conn: &mut Connection, range: &ScanRange) {
        loop {
            self.clock.sleep(self.config.head_poll_interval).await;
            let head = loop {
                match conn.head_number().await {
                    Ok(head) => break head,
                    Err(e) => {
                        warn!(error = %e, "head query failed, reconnecting");
                        *conn = self.source.acquire().await;
                    }
                }
            };
            if head >= range.end + self.config.confirmation_delay {
                debug!(head, range = %range, "confirmation depth cleared");
                return;
            }
            debug!(head, range = %range, "awaiting confirmation depth");
            self.clock.sleep(self.config.confirmation_backoff).await;
        }
    }

    /// Fetch logs for `range`, retrying the same bounds across failovers
    /// until a node answers. Safe: nothing for this range has been
    /// committed yet and inserts are idempotent regardless.
    async fn query_range(
        &mut self,
        conn: &mut Connection,
        range: &ScanRange,
    ) -> Vec<crate::types::RawLogEvent> {
        loop {
            match conn.logs(range, &self.filter).await {
                Ok(logs) => {
                    debug!(range = %range, count = logs.len(), epoch = conn.epoch(), "logs fetched");
                    return logs;
                }
                Err(e) => {
                    warn!(error = %e, range = %range, "log query failed, reconnecting");
                    *conn = self.source.acquire().await;
                }
            }
        }
    }

    /// Demultiplex a batch of raw logs through the registry.
    fn decode_batch(
        &self,
        logs: &[crate::types::RawLogEvent],
    ) -> Result<Vec<crate::types::DecodedRecord>, ScanError> {
        let mut records = Vec::new();
        for log in logs {
            match self.registry.decode(log) {
                Some(Ok(record)) => records.push(record),
                Some(Err(source)) => {
                    let err = ScanError::Decode {
                        address: log.address.clone(),
                        topic: log.topic0().unwrap_or("").to_string(),
                        source,
                    };
                    match self.config.decode_failure_policy {
                        DecodeFailurePolicy::Fatal => return Err(err),
                        DecodeFailurePolicy::SkipAndLog => {
                            error!(error = %err, tx = %log.tx_hash, "skipping undecodable log");
                        }
                    }
                }
                // Unregistered (address, topic0) pair — the topic space
                // is shared with contracts we do not mirror.
                None => {}
            }
        }
        Ok(records)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::client::ChainClient;
    use crate::registry::{EventRegistry, SHARE_PRICE_CHANGED_TOPIC};
    use crate::types::{DecodedRecord, GameKind, RawLogEvent};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    const POOL: &str = "0x1000000000000000000000000000000000000001";
    const SCALE: u128 = 1_000_000_000;

    /// Scripted node shared by every connection the mock source hands out.
    ///
    /// Head and log responses are consumed front-to-back; the last entry
    /// repeats forever. `Err` entries simulate transient RPC failures.
    #[derive(Default)]
    struct ScriptedNode {
        heads: Mutex<VecDeque<Result<u64, ()>>>,
        logs: Mutex<VecDeque<Result<Vec<RawLogEvent>, ()>>>,
        calls: Mutex<Vec<String>>,
        acquires: AtomicU64,
    }

    impl ScriptedNode {
        fn with_head(head: u64) -> Arc<Self> {
            let node = Self::default();
            node.heads.lock().unwrap().push_back(Ok(head));
            Arc::new(node)
        }

        fn push_head(&self, head: Result<u64, ()>) {
            self.heads.lock().unwrap().push_back(head);
        }

        fn push_logs(&self, logs: Result<Vec<RawLogEvent>, ()>) {
            self.logs.lock().unwrap().push_back(logs);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn next<T: Clone>(queue: &Mutex<VecDeque<Result<T, ()>>>) -> Result<T, ScanError> {
            let mut queue = queue.lock().unwrap();
            let entry = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(Err(()))
            };
            entry.map_err(|_| ScanError::Rpc("scripted failure".into()))
        }
    }

    struct ScriptedClient(Arc<ScriptedNode>);

    #[async_trait]
    impl ChainClient for ScriptedClient {
        async fn logs(
            &self,
            range: &ScanRange,
            _filter: &LogFilter,
        ) -> Result<Vec<RawLogEvent>, ScanError> {
            self.0.calls.lock().unwrap().push(format!("logs {range}"));
            ScriptedNode::next(&self.0.logs)
        }

        async fn head_number(&self) -> Result<u64, ScanError> {
            self.0.calls.lock().unwrap().push("head".into());
            ScriptedNode::next(&self.0.heads)
        }
    }

    struct ScriptedSource(Arc<ScriptedNode>);

    #[async_trait]
    impl ConnectionSource for ScriptedSource {
        async fn acquire(&mut self) -> Connection {
            let epoch = self.0.acquires.fetch_add(1, Ordering::Relaxed) + 1;
            Connection::new(epoch, Box::new(ScriptedClient(Arc::clone(&self.0))))
        }
    }

    /// Clock that completes instantly and journals every sleep.
    #[derive(Default)]
    struct InstantClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for InstantClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[derive(Default)]
    struct MemoryRecordStore {
        rows: Mutex<HashMap<String, DecodedRecord>>,
    }

    impl MemoryRecordStore {
        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn insert_if_absent(
            &self,
            record: &DecodedRecord,
        ) -> Result<InsertOutcome, ScanError> {
            let mut rows = self.rows.lock().unwrap();
            match rows.entry(record.natural_key()) {
                std::collections::hash_map::Entry::Occupied(_) => Ok(InsertOutcome::Skipped),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    Ok(InsertOutcome::Inserted)
                }
            }
        }
    }

    fn registry() -> EventRegistry {
        EventRegistry::builder(SCALE)
            .pool_contract(POOL)
            .game_contract(GameKind::Dice, "0x3000000000000000000000000000000000000003")
            .build()
    }

    fn price_log(block: u64, tx: &str) -> RawLogEvent {
        RawLogEvent {
            address: POOL.into(),
            topics: vec![SHARE_PRICE_CHANGED_TOPIC.into()],
            data: format!("0x{:064x}{:064x}", 5_000_000_000_000u128, 1_000_000_000_000u128),
            tx_hash: tx.into(),
            log_index: 0,
            block_number: block,
        }
    }

    struct Harness {
        node: Arc<ScriptedNode>,
        records: Arc<MemoryRecordStore>,
        checkpoint: Arc<MemoryCheckpointStore>,
        metrics: Arc<ScannerMetrics>,
    }

    fn build_scanner(config: ScannerConfig, harness: &Harness) -> RangeScanner {
        RangeScanner::new(
            config,
            Box::new(ScriptedSource(Arc::clone(&harness.node))),
            registry(),
            Arc::clone(&harness.records) as Arc<dyn RecordStore>,
            Arc::clone(&harness.checkpoint) as Arc<dyn CheckpointStore>,
            Arc::clone(&harness.metrics),
            Box::new(InstantClock::default()),
        )
    }

    fn harness(node: Arc<ScriptedNode>, checkpoint: u64) -> Harness {
        Harness {
            node,
            records: Arc::new(MemoryRecordStore::default()),
            checkpoint: Arc::new(MemoryCheckpointStore::seeded(checkpoint)),
            metrics: Arc::new(ScannerMetrics::new()),
        }
    }

    fn one_range_config() -> ScannerConfig {
        ScannerConfig {
            range_width: 50,
            confirmation_delay: 20,
            stop_at: Some(950),
            ..ScannerConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_checkpoint_is_fatal() {
        let node = ScriptedNode::with_head(1000);
        let mut harness = harness(node, 0);
        harness.checkpoint = Arc::new(MemoryCheckpointStore::new());

        let mut scanner = build_scanner(one_range_config(), &harness);
        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, ScanError::MissingCheckpoint));
    }

    #[tokio::test]
    async fn waits_for_confirmation_depth_before_opening_range() {
        // head = 1000 but scripted to start below the 970 threshold:
        // the range [900, 950) may only open once head >= 950 + 20.
        let node = Arc::new(ScriptedNode::default());
        node.push_head(Ok(960));
        node.push_head(Ok(969));
        node.push_head(Ok(1000));
        node.push_logs(Ok(vec![price_log(920, "0xaa")]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        scanner.run().await.unwrap();

        let calls = node.calls();
        // Two insufficient polls, one clearing poll, then exactly one query.
        assert_eq!(calls, vec!["head", "head", "head", "logs [900, 950)"]);
        assert_eq!(harness.checkpoint.load().await.unwrap(), Some(950));
        assert_eq!(harness.metrics.snapshot().last_committed_block, 950);
        assert_eq!(harness.records.len(), 1);
    }

    #[tokio::test]
    async fn retries_same_range_after_query_failure() {
        let node = ScriptedNode::with_head(1000);
        node.push_logs(Err(()));
        node.push_logs(Ok(vec![]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        scanner.run().await.unwrap();

        let calls = node.calls();
        let queries: Vec<_> = calls.iter().filter(|c| c.starts_with("logs")).collect();
        assert_eq!(queries, vec!["logs [900, 950)", "logs [900, 950)"]);
        // Initial acquire plus one failover re-acquire.
        assert_eq!(node.acquires.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn head_failure_fails_over_and_keeps_polling() {
        let node = Arc::new(ScriptedNode::default());
        node.push_head(Err(()));
        node.push_head(Ok(1000));
        node.push_logs(Ok(vec![]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        scanner.run().await.unwrap();

        assert_eq!(node.acquires.load(Ordering::Relaxed), 2);
        assert_eq!(harness.checkpoint.load().await.unwrap(), Some(950));
    }

    #[tokio::test]
    async fn malformed_matched_log_aborts_under_fatal_policy() {
        let node = ScriptedNode::with_head(1000);
        let mut bad = price_log(920, "0xbb");
        bad.data = "0x01".into(); // not a multiple of 32 bytes
        node.push_logs(Ok(vec![bad]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
        // Nothing committed for the poisoned range.
        assert_eq!(harness.checkpoint.load().await.unwrap(), Some(900));
        assert_eq!(harness.records.len(), 0);
    }

    #[tokio::test]
    async fn malformed_matched_log_is_skipped_under_skip_policy() {
        let node = ScriptedNode::with_head(1000);
        let mut bad = price_log(920, "0xbb");
        bad.data = "0x01".into();
        node.push_logs(Ok(vec![bad, price_log(921, "0xcc")]));

        let harness = harness(Arc::clone(&node), 900);
        let config = ScannerConfig {
            decode_failure_policy: DecodeFailurePolicy::SkipAndLog,
            ..one_range_config()
        };
        let mut scanner = build_scanner(config, &harness);
        scanner.run().await.unwrap();

        assert_eq!(harness.checkpoint.load().await.unwrap(), Some(950));
        assert_eq!(harness.records.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_logs_are_silently_dropped() {
        let node = ScriptedNode::with_head(1000);
        let mut foreign = price_log(920, "0xdd");
        foreign.address = "0x9999999999999999999999999999999999999999".into();
        node.push_logs(Ok(vec![foreign, price_log(921, "0xee")]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        scanner.run().await.unwrap();

        assert_eq!(harness.records.len(), 1);
    }

    #[tokio::test]
    async fn replaying_a_range_is_idempotent() {
        let node = ScriptedNode::with_head(1000);
        node.push_logs(Ok(vec![price_log(920, "0xaa"), price_log(921, "0xbb")]));

        let harness = harness(Arc::clone(&node), 900);
        let mut scanner = build_scanner(one_range_config(), &harness);
        scanner.run().await.unwrap();
        assert_eq!(harness.records.len(), 2);

        // Simulate a restart that lost the checkpoint advance: the same
        // range is scanned again against the same record store.
        let replay = Harness {
            node: Arc::clone(&harness.node),
            records: Arc::clone(&harness.records),
            checkpoint: Arc::new(MemoryCheckpointStore::seeded(900)),
            metrics: Arc::new(ScannerMetrics::new()),
        };
        let mut scanner = build_scanner(one_range_config(), &replay);
        scanner.run().await.unwrap();

        assert_eq!(harness.records.len(), 2, "no duplicates, no loss");
    }

    #[tokio::test]
    async fn consecutive_ranges_tile_the_chain() {
        let node = ScriptedNode::with_head(10_000);
        node.push_logs(Ok(vec![]));

        let harness = harness(Arc::clone(&node), 900);
        let config = ScannerConfig {
            range_width: 50,
            confirmation_delay: 20,
            stop_at: Some(1000),
            ..ScannerConfig::default()
        };
        let mut scanner = build_scanner(config, &harness);
        scanner.run().await.unwrap();

        let queries: Vec<_> = node
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("logs"))
            .collect();
        assert_eq!(queries, vec!["logs [900, 950)", "logs [950, 1000)"]);
        assert_eq!(harness.checkpoint.load().await.unwrap(), Some(1000));
    }
}
