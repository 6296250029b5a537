//! poolscan-storage — pluggable storage backends for the event mirror.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! Every backend implements the same three traits: the core's
//! `RecordStore` and `CheckpointStore` write seams plus the local
//! [`reader::MirrorReader`] query surface.

pub mod reader;

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStorage;
pub use reader::{GameRow, MirrorReader, PricePoint, ReferralTotal, PAGE_SIZE};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
