//! Event registry — demultiplexes raw logs into typed records.
//!
//! A lookup table built once at startup, keyed by
//! `(contract address, event-signature hash)`. A log whose pair has no
//! entry is dropped without error: the topic space is shared across
//! unrelated contracts, and a watched address can emit events we do not
//! mirror. A matched log that fails to parse is a real integrity
//! problem and is surfaced to the scanner's failure policy.

use std::collections::HashMap;

use crate::error::DecodeError;
use crate::types::{DecodedRecord, GameKind, LogFilter, RawLogEvent};

/// `SharePriceChanged(uint256,uint256)`
pub const SHARE_PRICE_CHANGED_TOPIC: &str =
    "0x12a9eb98c11681e9f28c1142fefc9caab82c5f97595c662a8f9cfc80b77c3f24";

/// `ReferralPayment(address,uint256)` — referrer indexed.
pub const REFERRAL_PAYMENT_TOPIC: &str =
    "0xb81973cea7d4fc7b28d145a42eb998654da3af31e886111cea088fc89ca76b76";

/// `GameResult(address,uint256)` — player indexed.
pub const GAME_RESULT_TOPIC: &str =
    "0x9d0859fd9865bf20a3561dc0f05b1cba79ac43380d10a5ae7bb29e998b67fb9b";

type DecodeFn = Box<dyn Fn(&RawLogEvent) -> Result<DecodedRecord, DecodeError> + Send + Sync>;

/// Static `(address, topic0) → decoder` table.
pub struct EventRegistry {
    decoders: HashMap<(String, String), DecodeFn>,
}

impl EventRegistry {
    pub fn builder(scale_factor: u128) -> EventRegistryBuilder {
        EventRegistryBuilder {
            scale_factor,
            decoders: HashMap::new(),
        }
    }

    /// Route a raw log to its decoder.
    ///
    /// `None` means the `(address, topic0)` pair is not registered and
    /// the log is silently ignored.
    pub fn decode(&self, log: &RawLogEvent) -> Option<Result<DecodedRecord, DecodeError>> {
        let topic0 = log.topic0()?;
        let key = (log.address.to_ascii_lowercase(), topic0.to_ascii_lowercase());
        self.decoders.get(&key).map(|decode| decode(log))
    }

    /// The address/topic filter covering every registered decoder.
    pub fn filter(&self) -> LogFilter {
        let mut addresses: Vec<String> =
            self.decoders.keys().map(|(addr, _)| addr.clone()).collect();
        let mut topic0_values: Vec<String> =
            self.decoders.keys().map(|(_, topic)| topic.clone()).collect();
        addresses.sort();
        addresses.dedup();
        topic0_values.sort();
        topic0_values.dedup();
        LogFilter {
            addresses,
            topic0_values,
        }
    }

    /// Number of registered `(address, topic0)` pairs.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

/// Builds an [`EventRegistry`] from the watched contract set.
pub struct EventRegistryBuilder {
    scale_factor: u128,
    decoders: HashMap<(String, String), DecodeFn>,
}

impl EventRegistryBuilder {
    fn register(&mut self, address: &str, topic: &str, decode: DecodeFn) {
        self.decoders.insert(
            (address.to_ascii_lowercase(), topic.to_ascii_lowercase()),
            decode,
        );
    }

    /// Watch `SharePriceChanged` on the pool contract.
    pub fn pool_contract(mut self, address: &str) -> Self {
        let scale = self.scale_factor;
        self.register(
            address,
            SHARE_PRICE_CHANGED_TOPIC,
            Box::new(move |log| decode_price_changed(log, scale)),
        );
        self
    }

    /// Watch `ReferralPayment` on the referral contract.
    pub fn referral_contract(mut self, address: &str) -> Self {
        let scale = self.scale_factor;
        self.register(
            address,
            REFERRAL_PAYMENT_TOPIC,
            Box::new(move |log| decode_referral_payment(log, scale)),
        );
        self
    }

    /// Watch `GameResult` on a game contract. The kind is fixed by the
    /// emitting address, not carried in the payload.
    pub fn game_contract(mut self, game: GameKind, address: &str) -> Self {
        let scale = self.scale_factor;
        self.register(
            address,
            GAME_RESULT_TOPIC,
            Box::new(move |log| decode_game_result(log, game, scale)),
        );
        self
    }

    pub fn build(self) -> EventRegistry {
        EventRegistry {
            decoders: self.decoders,
        }
    }
}

// ─── Decoders ────────────────────────────────────────────────────────────────

fn decode_price_changed(log: &RawLogEvent, scale: u128) -> Result<DecodedRecord, DecodeError> {
    let words = payload_words(&log.data)?;
    if words.len() < 2 {
        return Err(DecodeError::ShortPayload {
            expected: 2,
            got: words.len(),
        });
    }
    Ok(DecodedRecord::PriceChanged {
        tx_hash: log.tx_hash.clone(),
        block_number: log.block_number,
        nom_scaled: scale_down(word_u128(&words[0])?, scale)?,
        denom_scaled: scale_down(word_u128(&words[1])?, scale)?,
    })
}

fn decode_referral_payment(log: &RawLogEvent, scale: u128) -> Result<DecodedRecord, DecodeError> {
    let words = payload_words(&log.data)?;
    if words.is_empty() {
        return Err(DecodeError::ShortPayload {
            expected: 1,
            got: 0,
        });
    }
    Ok(DecodedRecord::ReferralPayment {
        tx_hash: log.tx_hash.clone(),
        log_index: log.log_index,
        block_number: log.block_number,
        referrer: topic_address(log, 1)?,
        amount_scaled: scale_down(word_u128(&words[0])?, scale)?,
    })
}

fn decode_game_result(
    log: &RawLogEvent,
    game: GameKind,
    scale: u128,
) -> Result<DecodedRecord, DecodeError> {
    let words = payload_words(&log.data)?;
    if words.is_empty() {
        return Err(DecodeError::ShortPayload {
            expected: 1,
            got: 0,
        });
    }
    Ok(DecodedRecord::GameResult {
        tx_hash: log.tx_hash.clone(),
        log_index: log.log_index,
        block_number: log.block_number,
        game,
        player: topic_address(log, 1)?,
        amount_scaled: scale_down(word_u128(&words[0])?, scale)?,
    })
}

// ─── Word-level helpers ──────────────────────────────────────────────────────

/// Split the ABI-encoded data payload into 32-byte words.
fn payload_words(data: &str) -> Result<Vec<[u8; 32]>, DecodeError> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(stripped).map_err(|e| DecodeError::InvalidHex {
        field: "data".into(),
        reason: e.to_string(),
    })?;
    if bytes.len() % 32 != 0 {
        return Err(DecodeError::InvalidHex {
            field: "data".into(),
            reason: format!("length {} is not a multiple of 32", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Interpret a 32-byte big-endian word as `u128`.
///
/// On-chain amounts are `uint256`; anything above 128 bits is out of
/// range for every value this system mirrors.
fn word_u128(word: &[u8; 32]) -> Result<u128, DecodeError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow);
    }
    let mut lower = [0u8; 16];
    lower.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(lower))
}

/// Truncating fixed-point division down to application units.
///
/// Floor-toward-zero by construction; the fractional remainder is
/// discarded, never rounded.
fn scale_down(value: u128, scale: u128) -> Result<u64, DecodeError> {
    u64::try_from(value / scale).map_err(|_| DecodeError::Overflow)
}

/// Extract the address from an indexed topic (last 20 of 32 bytes).
fn topic_address(log: &RawLogEvent, index: usize) -> Result<String, DecodeError> {
    let topic = log
        .topics
        .get(index)
        .ok_or(DecodeError::MissingTopic { index })?;
    let stripped = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes = hex::decode(stripped).map_err(|e| DecodeError::InvalidHex {
        field: format!("topics[{index}]"),
        reason: e.to_string(),
    })?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidHex {
            field: format!("topics[{index}]"),
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(format!("0x{}", hex::encode(&bytes[12..])))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
