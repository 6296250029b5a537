//! In-memory backend (dev/testing, no persistence).

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use poolscan_core::{
    CheckpointStore, DecodedRecord, GameKind, InsertOutcome, RecordStore, ScanError,
};

use crate::reader::{share_price, GameRow, MirrorReader, PricePoint, ReferralTotal, PAGE_SIZE};

/// In-memory mirror storage.
///
/// Backs the same three traits as the SQLite backend so the scanner and
/// the read API can be exercised without a database file.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<DecodedRecord>,
    /// Natural keys, qualified by record kind so the per-table keyspaces
    /// stay separate.
    keys: HashSet<String>,
    checkpoint: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, across all kinds.
    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

fn qualified_key(record: &DecodedRecord) -> String {
    let table = match record {
        DecodedRecord::PriceChanged { .. } => "price",
        DecodedRecord::ReferralPayment { .. } => "referral",
        DecodedRecord::GameResult { .. } => "game",
    };
    format!("{table}/{}", record.natural_key())
}

#[async_trait]
impl RecordStore for MemoryStorage {
    async fn insert_if_absent(&self, record: &DecodedRecord) -> Result<InsertOutcome, ScanError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.keys.insert(qualified_key(record)) {
            inner.records.push(record.clone());
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Skipped)
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryStorage {
    async fn load(&self) -> Result<Option<u64>, ScanError> {
        Ok(self.inner.lock().unwrap().checkpoint)
    }

    async fn seed_if_absent(&self, block: u64) -> Result<(), ScanError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.checkpoint.is_none() {
            inner.checkpoint = Some(block);
        }
        Ok(())
    }

    async fn advance(&self, block: u64) -> Result<(), ScanError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.checkpoint {
            Some(current) if current >= block => {}
            _ => inner.checkpoint = Some(block),
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorReader for MemoryStorage {
    async fn price_history(&self) -> Result<Vec<PricePoint>, ScanError> {
        let inner = self.inner.lock().unwrap();
        let mut points: Vec<PricePoint> = inner
            .records
            .iter()
            .filter_map(|r| match r {
                DecodedRecord::PriceChanged {
                    block_number,
                    nom_scaled,
                    denom_scaled,
                    ..
                } => Some(PricePoint {
                    block: *block_number,
                    share_price: share_price(*nom_scaled, *denom_scaled),
                }),
                _ => None,
            })
            .collect();
        points.sort_by_key(|p| p.block);
        Ok(points)
    }

    async fn referral_totals(
        &self,
        referrer: Option<&str>,
    ) -> Result<Vec<ReferralTotal>, ScanError> {
        let inner = self.inner.lock().unwrap();
        let mut totals: Vec<ReferralTotal> = Vec::new();
        for record in &inner.records {
            if let DecodedRecord::ReferralPayment {
                referrer: addr,
                amount_scaled,
                ..
            } = record
            {
                if let Some(wanted) = referrer {
                    if !addr.eq_ignore_ascii_case(wanted) {
                        continue;
                    }
                }
                match totals.iter_mut().find(|t| t.referrer == *addr) {
                    Some(total) => total.total += amount_scaled,
                    None => totals.push(ReferralTotal {
                        referrer: addr.clone(),
                        total: *amount_scaled,
                    }),
                }
            }
        }
        totals.sort_by(|a, b| b.total.cmp(&a.total));
        Ok(totals)
    }

    async fn recent_games(&self, kind: Option<GameKind>) -> Result<Vec<GameRow>, ScanError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<(u64, u32, GameRow)> = inner
            .records
            .iter()
            .filter_map(|r| match r {
                DecodedRecord::GameResult {
                    tx_hash,
                    log_index,
                    block_number,
                    game,
                    player,
                    amount_scaled,
                } if kind.is_none() || kind == Some(*game) => Some((
                    *block_number,
                    *log_index,
                    GameRow {
                        block: *block_number,
                        game: *game,
                        player: player.clone(),
                        amount: *amount_scaled,
                        tx_hash: tx_hash.clone(),
                    },
                )),
                _ => None,
            })
            .collect();
        rows.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        rows.truncate(PAGE_SIZE);
        Ok(rows.into_iter().map(|(_, _, row)| row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(tx: &str, block: u64, nom: u64, denom: u64) -> DecodedRecord {
        DecodedRecord::PriceChanged {
            tx_hash: tx.into(),
            block_number: block,
            nom_scaled: nom,
            denom_scaled: denom,
        }
    }

    fn referral(tx: &str, idx: u32, referrer: &str, amount: u64) -> DecodedRecord {
        DecodedRecord::ReferralPayment {
            tx_hash: tx.into(),
            log_index: idx,
            block_number: 100,
            referrer: referrer.into(),
            amount_scaled: amount,
        }
    }

    fn game(tx: &str, idx: u32, block: u64, kind: GameKind) -> DecodedRecord {
        DecodedRecord::GameResult {
            tx_hash: tx.into(),
            log_index: idx,
            block_number: block,
            game: kind,
            player: "0xplayer".into(),
            amount_scaled: 42,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_skipped() {
        let store = MemoryStorage::new();
        let record = price("0xaaa", 100, 5000, 1000);

        assert_eq!(
            store.insert_if_absent(&record).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_if_absent(&record).await.unwrap(),
            InsertOutcome::Skipped
        );
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn same_key_in_different_tables_does_not_collide() {
        let store = MemoryStorage::new();
        store
            .insert_if_absent(&referral("0xaaa", 0, "0xref", 10))
            .await
            .unwrap();
        let outcome = store
            .insert_if_absent(&game("0xaaa", 0, 100, GameKind::Dice))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn price_history_is_block_ordered() {
        let store = MemoryStorage::new();
        store.insert_if_absent(&price("0xb", 200, 5000, 1000)).await.unwrap();
        store.insert_if_absent(&price("0xa", 100, 1000, 1000)).await.unwrap();

        let history = store.price_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].block, 100);
        assert_eq!(history[0].share_price, 1.0);
        assert_eq!(history[1].share_price, 5.0);
    }

    #[tokio::test]
    async fn referral_totals_aggregate_case_insensitively() {
        let store = MemoryStorage::new();
        store.insert_if_absent(&referral("0x1", 0, "0xABCD", 10)).await.unwrap();
        store.insert_if_absent(&referral("0x2", 0, "0xABCD", 5)).await.unwrap();
        store.insert_if_absent(&referral("0x3", 0, "0xother", 7)).await.unwrap();

        let all = store.referral_totals(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store.referral_totals(Some("0xabcd")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].total, 15);
    }

    #[tokio::test]
    async fn recent_games_filter_and_order() {
        let store = MemoryStorage::new();
        store.insert_if_absent(&game("0x1", 0, 100, GameKind::Dice)).await.unwrap();
        store.insert_if_absent(&game("0x2", 0, 300, GameKind::Slots)).await.unwrap();
        store.insert_if_absent(&game("0x3", 0, 200, GameKind::Dice)).await.unwrap();

        let all = store.recent_games(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].block, 300);

        let dice = store.recent_games(Some(GameKind::Dice)).await.unwrap();
        assert_eq!(dice.len(), 2);
        assert_eq!(dice[0].block, 200);
    }
}
