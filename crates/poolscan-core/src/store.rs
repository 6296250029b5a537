//! Idempotent record persistence.

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::DecodedRecord;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same natural key already existed; nothing changed.
    Skipped,
}

/// Write side of the mirror.
///
/// `insert_if_absent` never overwrites and never fails on a duplicate
/// key. Re-scanning an already-processed range is therefore a safe
/// no-op, which is what makes retrying a failed range query correct:
/// at-least-once delivery plus idempotent keys gives effectively-once
/// storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_if_absent(&self, record: &DecodedRecord) -> Result<InsertOutcome, ScanError>;
}
