//! Shared types for the scanning pipeline.

use serde::{Deserialize, Serialize};

// ─── ScanRange ───────────────────────────────────────────────────────────────

/// A half-open block range `[start, end)`.
///
/// Consecutive ranges tile the chain: the next range's `start` is always the
/// previous range's `end`, so no block is skipped or scanned under two
/// different checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    /// First block of the range (inclusive).
    pub start: u64,
    /// End of the range (exclusive).
    pub end: u64,
}

impl ScanRange {
    /// Create the range `[start, start + width)`.
    pub fn open(start: u64, width: u64) -> Self {
        Self {
            start,
            end: start + width,
        }
    }

    /// Last block covered by the range (inclusive), for `eth_getLogs`
    /// which takes an inclusive `toBlock`.
    pub fn last_block(&self) -> u64 {
        self.end - 1
    }

    /// The range that directly follows this one, with the same width.
    pub fn next(&self) -> Self {
        Self {
            start: self.end,
            end: self.end + (self.end - self.start),
        }
    }

    /// Number of blocks in the range.
    pub fn width(&self) -> u64 {
        self.end - self.start
    }
}

impl std::fmt::Display for ScanRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ─── RawLogEvent ─────────────────────────────────────────────────────────────

/// A raw EVM log, produced by one range query and consumed once by the
/// event registry. Addresses and payloads are `0x`-prefixed hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogEvent {
    /// Contract address that emitted the log.
    pub address: String,
    /// Event topics; `topics[0]` is the event-signature hash.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed payload.
    pub data: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Position of the log within its block.
    pub log_index: u32,
    /// Block the log was included in.
    pub block_number: u64,
}

impl RawLogEvent {
    /// The event-signature hash (`topics[0]`), if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

// ─── LogFilter ───────────────────────────────────────────────────────────────

/// Address + topic0 filter sent with every range query.
///
/// Built once from the event registry; both sets are fixed for the lifetime
/// of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    /// Watched contract addresses (lowercase hex).
    pub addresses: Vec<String>,
    /// Watched event-signature hashes (lowercase hex).
    pub topic0_values: Vec<String>,
}

impl LogFilter {
    /// Returns `true` if `address` is watched.
    pub fn matches_address(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }

    /// Returns `true` if `topic0` is watched.
    pub fn matches_topic0(&self, topic0: &str) -> bool {
        self.topic0_values.iter().any(|t| t.eq_ignore_ascii_case(topic0))
    }
}

// ─── GameKind ────────────────────────────────────────────────────────────────

/// The game a `GameResult` log belongs to.
///
/// The kind is not part of the on-chain payload; it is derived from the
/// emitting contract address at registry-build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Dice,
    Roulette,
    Slots,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dice => "dice",
            Self::Roulette => "roulette",
            Self::Slots => "slots",
        }
    }

    /// All kinds, in a stable order.
    pub const ALL: [GameKind; 3] = [Self::Dice, Self::Roulette, Self::Slots];
}

impl std::str::FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dice" => Ok(Self::Dice),
            "roulette" => Ok(Self::Roulette),
            "slots" => Ok(Self::Slots),
            other => Err(format!("unknown game kind: {other}")),
        }
    }
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── DecodedRecord ───────────────────────────────────────────────────────────

/// A typed record produced by the event registry, ready for idempotent
/// persistence. Scaled amounts have already been divided down to
/// application units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedRecord {
    /// Pool share price changed. At most one per transaction, so the
    /// transaction hash alone is the natural key.
    PriceChanged {
        tx_hash: String,
        block_number: u64,
        nom_scaled: u64,
        denom_scaled: u64,
    },
    /// A referral fee was paid out.
    ReferralPayment {
        tx_hash: String,
        log_index: u32,
        block_number: u64,
        referrer: String,
        amount_scaled: u64,
    },
    /// A game round settled.
    GameResult {
        tx_hash: String,
        log_index: u32,
        block_number: u64,
        game: GameKind,
        player: String,
        amount_scaled: u64,
    },
}

impl DecodedRecord {
    /// The natural unique key for idempotent insertion.
    ///
    /// `PriceChanged` occurs at most once per transaction and is keyed by
    /// the transaction hash alone; everything else is keyed by
    /// `(tx_hash, log_index)`.
    pub fn natural_key(&self) -> String {
        match self {
            Self::PriceChanged { tx_hash, .. } => tx_hash.clone(),
            Self::ReferralPayment {
                tx_hash, log_index, ..
            }
            | Self::GameResult {
                tx_hash, log_index, ..
            } => format!("{tx_hash}:{log_index}"),
        }
    }

    /// Block the record originated from.
    pub fn block_number(&self) -> u64 {
        match self {
            Self::PriceChanged { block_number, .. }
            | Self::ReferralPayment { block_number, .. }
            | Self::GameResult { block_number, .. } => *block_number,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_tile_without_gaps() {
        let first = ScanRange::open(900, 50);
        assert_eq!(first.start, 900);
        assert_eq!(first.end, 950);
        assert_eq!(first.last_block(), 949);

        let second = first.next();
        assert_eq!(second.start, first.end);
        assert_eq!(second.width(), first.width());
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let filter = LogFilter {
            addresses: vec!["0xabcdef0123".into()],
            topic0_values: vec!["0x12a9eb".into()],
        };
        assert!(filter.matches_address("0xABCDEF0123"));
        assert!(!filter.matches_address("0x111111"));
        assert!(filter.matches_topic0("0x12A9EB"));
    }

    #[test]
    fn game_kind_parse_roundtrip() {
        for kind in GameKind::ALL {
            assert_eq!(kind.as_str().parse::<GameKind>().unwrap(), kind);
        }
        assert!("poker".parse::<GameKind>().is_err());
    }

    #[test]
    fn natural_key_shape() {
        let price = DecodedRecord::PriceChanged {
            tx_hash: "0xaa".into(),
            block_number: 1,
            nom_scaled: 10,
            denom_scaled: 2,
        };
        assert_eq!(price.natural_key(), "0xaa");

        let game = DecodedRecord::GameResult {
            tx_hash: "0xbb".into(),
            log_index: 7,
            block_number: 1,
            game: GameKind::Dice,
            player: "0xcc".into(),
            amount_scaled: 5,
        };
        assert_eq!(game.natural_key(), "0xbb:7");
    }
}
