//! Environment-driven daemon configuration.

use std::env;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use poolscan_core::{DecodeFailurePolicy, GameKind};

/// Everything the daemon needs, resolved from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Node endpoints in failover order (`RPC_URL_1`, `RPC_URL_2`, …).
    pub rpc_urls: Vec<String>,
    pub pool_contract: String,
    pub referral_contract: String,
    /// Game contracts that were configured; absent kinds are not watched.
    pub game_contracts: Vec<(GameKind, String)>,
    /// SQLite database path or URL.
    pub database_url: String,
    /// Checkpoint seed, consulted only when no checkpoint row exists.
    pub start_block: u64,
    pub scale_factor: u128,
    pub scan_width: u64,
    pub confirmation_delay: u64,
    pub http_port: u16,
    pub decode_failure_policy: DecodeFailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key→value lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Numbered endpoint list; the first gap terminates it.
        let mut rpc_urls = Vec::new();
        for i in 1.. {
            match lookup(&format!("RPC_URL_{i}")) {
                Some(url) if !url.is_empty() => rpc_urls.push(url),
                _ => break,
            }
        }
        if rpc_urls.is_empty() {
            bail!("no RPC endpoints configured (set RPC_URL_1)");
        }

        let require = |key: &str| {
            lookup(key).with_context(|| format!("missing required environment variable {key}"))
        };

        let mut game_contracts = Vec::new();
        for kind in GameKind::ALL {
            let key = format!("{}_CONTRACT", kind.as_str().to_uppercase());
            if let Some(address) = lookup(&key) {
                game_contracts.push((kind, address));
            }
        }

        Ok(Self {
            pool_contract: require("POOL_CONTRACT")?,
            referral_contract: require("REFERRAL_CONTRACT")?,
            game_contracts,
            database_url: require("DATABASE_URL")?,
            start_block: parse_or(&lookup, "START_BLOCK", 0)?,
            scale_factor: parse_scale(&lookup)?,
            scan_width: parse_or(&lookup, "SCAN_WIDTH", 50)?,
            confirmation_delay: parse_or(&lookup, "CONFIRMATION_DELAY", 50)?,
            http_port: parse_or(&lookup, "HTTP_PORT", 8080)?,
            decode_failure_policy: parse_or(
                &lookup,
                "DECODE_FAILURE_POLICY",
                DecodeFailurePolicy::Fatal,
            )?,
            rpc_urls,
        })
    }
}

fn parse_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} {raw:?}: {e}")),
        None => Ok(default),
    }
}

/// `SCALE_FACTOR` accepts decimal or `0x`-prefixed hex.
/// Default 2^32, matching the on-chain fixed-point encoding.
fn parse_scale(lookup: impl Fn(&str) -> Option<String>) -> Result<u128> {
    match lookup("SCALE_FACTOR") {
        None => Ok(0x1_0000_0000),
        Some(raw) => {
            let parsed = match raw.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16),
                None => raw.parse(),
            };
            let scale = parsed.map_err(|e| anyhow::anyhow!("invalid SCALE_FACTOR {raw:?}: {e}"))?;
            if scale == 0 {
                bail!("SCALE_FACTOR must be non-zero");
            }
            Ok(scale)
        }
    }
}
