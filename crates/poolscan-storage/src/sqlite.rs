//! SQLite backend for the event mirror.
//!
//! One file holds the three record tables plus the scan checkpoint.
//! Uses `sqlx` with WAL mode for concurrent read performance; inserts
//! rely on `ON CONFLICT DO NOTHING` against each table's natural key so
//! a replayed range never duplicates or overwrites a row.
//!
//! # Usage
//! ```rust,no_run
//! use poolscan_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./mirror.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use poolscan_core::{
    CheckpointStore, DecodedRecord, GameKind, InsertOutcome, RecordStore, ScanError,
};

use crate::reader::{share_price, GameRow, MirrorReader, PricePoint, ReferralTotal, PAGE_SIZE};

/// SQLite-backed storage for mirrored records and the scan checkpoint.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./mirror.db"`) or a full
    /// SQLite URL (`"sqlite:./mirror.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ScanError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ScanError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ScanError> {
        // WAL mode — better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS price_changes (
                tx_hash      TEXT    PRIMARY KEY,
                block_number INTEGER NOT NULL,
                nom_scaled   INTEGER NOT NULL,
                denom_scaled INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS referral_payments (
                tx_hash       TEXT    NOT NULL,
                log_index     INTEGER NOT NULL,
                block_number  INTEGER NOT NULL,
                referrer      TEXT    NOT NULL,
                amount_scaled INTEGER NOT NULL,
                PRIMARY KEY (tx_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game_results (
                tx_hash       TEXT    NOT NULL,
                log_index     INTEGER NOT NULL,
                block_number  INTEGER NOT NULL,
                game_kind     TEXT    NOT NULL,
                player        TEXT    NOT NULL,
                amount_scaled INTEGER NOT NULL,
                PRIMARY KEY (tx_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        // Single logical row, pinned to id 0.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scan_checkpoint (
                id           INTEGER PRIMARY KEY CHECK (id = 0),
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        // Indexes for the read API's query patterns
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_referrals_referrer
             ON referral_payments (referrer);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_games_block
             ON game_results (block_number);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn insert_if_absent(&self, record: &DecodedRecord) -> Result<InsertOutcome, ScanError> {
        let result = match record {
            DecodedRecord::PriceChanged {
                tx_hash,
                block_number,
                nom_scaled,
                denom_scaled,
            } => {
                sqlx::query(
                    "INSERT INTO price_changes (tx_hash, block_number, nom_scaled, denom_scaled)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT (tx_hash) DO NOTHING",
                )
                .bind(tx_hash)
                .bind(*block_number as i64)
                .bind(*nom_scaled as i64)
                .bind(*denom_scaled as i64)
                .execute(&self.pool)
                .await
            }
            DecodedRecord::ReferralPayment {
                tx_hash,
                log_index,
                block_number,
                referrer,
                amount_scaled,
            } => {
                sqlx::query(
                    "INSERT INTO referral_payments
                     (tx_hash, log_index, block_number, referrer, amount_scaled)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT (tx_hash, log_index) DO NOTHING",
                )
                .bind(tx_hash)
                .bind(*log_index as i64)
                .bind(*block_number as i64)
                .bind(referrer)
                .bind(*amount_scaled as i64)
                .execute(&self.pool)
                .await
            }
            DecodedRecord::GameResult {
                tx_hash,
                log_index,
                block_number,
                game,
                player,
                amount_scaled,
            } => {
                sqlx::query(
                    "INSERT INTO game_results
                     (tx_hash, log_index, block_number, game_kind, player, amount_scaled)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT (tx_hash, log_index) DO NOTHING",
                )
                .bind(tx_hash)
                .bind(*log_index as i64)
                .bind(*block_number as i64)
                .bind(game.as_str())
                .bind(player)
                .bind(*amount_scaled as i64)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        if result.rows_affected() == 1 {
            debug!(key = %record.natural_key(), block = record.block_number(), "record stored");
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Skipped)
        }
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self) -> Result<Option<u64>, ScanError> {
        let row = sqlx::query("SELECT block_number FROM scan_checkpoint WHERE id = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get::<i64, _>("block_number") as u64))
    }

    async fn seed_if_absent(&self, block: u64) -> Result<(), ScanError> {
        sqlx::query(
            "INSERT INTO scan_checkpoint (id, block_number, updated_at)
             VALUES (0, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(block as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn advance(&self, block: u64) -> Result<(), ScanError> {
        // The WHERE clause is the monotonic guard: a stale writer's
        // smaller value affects zero rows.
        let result = sqlx::query(
            "UPDATE scan_checkpoint SET block_number = ?, updated_at = ?
             WHERE id = 0 AND block_number < ?",
        )
        .bind(block as i64)
        .bind(chrono::Utc::now().timestamp())
        .bind(block as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        if result.rows_affected() == 1 {
            debug!(block, "checkpoint advanced");
        }
        Ok(())
    }
}

// ─── MirrorReader impl ───────────────────────────────────────────────────────

#[async_trait]
impl MirrorReader for SqliteStorage {
    async fn price_history(&self) -> Result<Vec<PricePoint>, ScanError> {
        let rows = sqlx::query(
            "SELECT block_number, nom_scaled, denom_scaled
             FROM price_changes ORDER BY block_number",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| PricePoint {
                block: r.get::<i64, _>("block_number") as u64,
                share_price: share_price(
                    r.get::<i64, _>("nom_scaled") as u64,
                    r.get::<i64, _>("denom_scaled") as u64,
                ),
            })
            .collect())
    }

    async fn referral_totals(
        &self,
        referrer: Option<&str>,
    ) -> Result<Vec<ReferralTotal>, ScanError> {
        let query = match referrer {
            Some(addr) => sqlx::query(
                "SELECT referrer, SUM(amount_scaled) AS total
                 FROM referral_payments
                 WHERE LOWER(referrer) = LOWER(?)
                 GROUP BY referrer ORDER BY total DESC",
            )
            .bind(addr),
            None => sqlx::query(
                "SELECT referrer, SUM(amount_scaled) AS total
                 FROM referral_payments
                 GROUP BY referrer ORDER BY total DESC",
            ),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| ReferralTotal {
                referrer: r.get("referrer"),
                total: r.get::<i64, _>("total") as u64,
            })
            .collect())
    }

    async fn recent_games(&self, kind: Option<GameKind>) -> Result<Vec<GameRow>, ScanError> {
        let query = match kind {
            Some(kind) => sqlx::query(
                "SELECT tx_hash, block_number, game_kind, player, amount_scaled
                 FROM game_results WHERE game_kind = ?
                 ORDER BY block_number DESC, log_index DESC LIMIT ?",
            )
            .bind(kind.as_str())
            .bind(PAGE_SIZE as i64),
            None => sqlx::query(
                "SELECT tx_hash, block_number, game_kind, player, amount_scaled
                 FROM game_results
                 ORDER BY block_number DESC, log_index DESC LIMIT ?",
            )
            .bind(PAGE_SIZE as i64),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        let mut games = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("game_kind");
            let game: GameKind = kind_str
                .parse()
                .map_err(|e: String| ScanError::Storage(e))?;
            games.push(GameRow {
                block: row.get::<i64, _>("block_number") as u64,
                game,
                player: row.get("player"),
                amount: row.get::<i64, _>("amount_scaled") as u64,
                tx_hash: row.get("tx_hash"),
            });
        }
        Ok(games)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
