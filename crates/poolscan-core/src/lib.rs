//! poolscan-core — the scanning/reconciliation engine behind the mirror.
//!
//! # Architecture
//!
//! ```text
//! RangeScanner
//!     ├── ConnectionSource  (failover; poolscan-rpc in production)
//!     ├── EventRegistry     ((address, topic0) → decoder)
//!     ├── RecordStore       (idempotent inserts; poolscan-storage)
//!     ├── CheckpointStore   (monotonic scan cursor)
//!     ├── ScannerMetrics    (shared atomics, read by the API)
//!     └── Clock             (injectable sleeps)
//! ```

pub mod checkpoint;
pub mod client;
pub mod clock;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod scanner;
pub mod store;
pub mod types;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use client::{ChainClient, Connection, ConnectionSource};
pub use clock::{Clock, TokioClock};
pub use error::{DecodeError, ScanError};
pub use metrics::{MetricsSnapshot, ScannerMetrics};
pub use registry::{EventRegistry, EventRegistryBuilder};
pub use scanner::{DecodeFailurePolicy, RangeScanner, ScanState, ScannerConfig};
pub use store::{InsertOutcome, RecordStore};
pub use types::{DecodedRecord, GameKind, LogFilter, RawLogEvent, ScanRange};
