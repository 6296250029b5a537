//! Read side of the mirror, consumed by the HTTP API.

use async_trait::async_trait;
use serde::Serialize;

use poolscan_core::{GameKind, ScanError};

/// Fixed page size for the recent-games listing.
pub const PAGE_SIZE: usize = 50;

/// One share-price observation, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    pub block: u64,
    pub share_price: f64,
}

/// Lifetime referral payout total for one referrer address.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralTotal {
    pub referrer: String,
    pub total: u64,
}

/// One settled game, most recent first.
#[derive(Debug, Clone, Serialize)]
pub struct GameRow {
    pub block: u64,
    pub game: GameKind,
    pub player: String,
    pub amount: u64,
    pub tx_hash: String,
}

/// Query surface over the mirrored records.
#[async_trait]
pub trait MirrorReader: Send + Sync {
    /// Full share-price history, ascending by block.
    async fn price_history(&self) -> Result<Vec<PricePoint>, ScanError>;

    /// Payout totals grouped by referrer. The optional filter matches
    /// the referrer address case-insensitively.
    async fn referral_totals(&self, referrer: Option<&str>) -> Result<Vec<ReferralTotal>, ScanError>;

    /// Most recent games first, at most [`PAGE_SIZE`] rows, optionally
    /// restricted to one game kind.
    async fn recent_games(&self, kind: Option<GameKind>) -> Result<Vec<GameRow>, ScanError>;
}

/// Share price as a float ratio. A zero denominator never decodes to a
/// meaningful price; report it as zero rather than infinity.
pub(crate) fn share_price(nom_scaled: u64, denom_scaled: u64) -> f64 {
    if denom_scaled == 0 {
        0.0
    } else {
        nom_scaled as f64 / denom_scaled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_price_ratio() {
        assert_eq!(share_price(5000, 1000), 5.0);
        assert_eq!(share_price(1, 2), 0.5);
        assert_eq!(share_price(1, 0), 0.0);
    }
}
