//! Checkpoint store — the persisted scan cursor.
//!
//! The checkpoint is a single scalar: the lowest block number not yet
//! fully scanned and committed. It is seeded once at first bootstrap and
//! afterwards mutated only by the scanner, after a whole range has been
//! persisted. The store enforces monotonicity so a retried or concurrent
//! writer can never regress the cursor.

use async_trait::async_trait;

use crate::error::ScanError;

/// Storage for the scan cursor.
///
/// Implemented by `poolscan-storage` for SQLite and by
/// [`MemoryCheckpointStore`] for tests.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the current cursor, or `None` if it was never seeded.
    async fn load(&self) -> Result<Option<u64>, ScanError>;

    /// Write the initial cursor, unless one already exists.
    ///
    /// Used only at bootstrap; a later call with a different value is a
    /// no-op.
    async fn seed_if_absent(&self, block: u64) -> Result<(), ScanError>;

    /// Advance the cursor to `block` if it is strictly greater than the
    /// stored value; otherwise do nothing.
    async fn advance(&self, block: u64) -> Result<(), ScanError>;
}

// ─── In-memory store (for testing) ───────────────────────────────────────────

use std::sync::Mutex;

/// In-memory checkpoint store for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<Option<u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded at `block`.
    pub fn seeded(block: u64) -> Self {
        Self {
            value: Mutex::new(Some(block)),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<u64>, ScanError> {
        Ok(*self.value.lock().unwrap())
    }

    async fn seed_if_absent(&self, block: u64) -> Result<(), ScanError> {
        let mut value = self.value.lock().unwrap();
        if value.is_none() {
            *value = Some(block);
        }
        Ok(())
    }

    async fn advance(&self, block: u64) -> Result<(), ScanError> {
        let mut value = self.value.lock().unwrap();
        match *value {
            Some(current) if current >= block => {}
            _ => *value = Some(block),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_empty_until_seeded() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.seed_if_absent(900).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(900));
    }

    #[tokio::test]
    async fn seed_is_first_writer_wins() {
        let store = MemoryCheckpointStore::new();
        store.seed_if_absent(900).await.unwrap();
        store.seed_if_absent(100).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(900));
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let store = MemoryCheckpointStore::seeded(900);

        store.advance(950).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(950));

        // A stale writer cannot regress the cursor.
        store.advance(920).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(950));

        // Equal value is also a no-op.
        store.advance(950).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(950));
    }
}
