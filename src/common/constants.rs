/// Defines global constants and environment configuration for the engine.
///
/// Contains protocol constants, environment variable parsing, and the defaults used when a
/// variable is not set.
use anyhow::{anyhow, Context, Result};
use ethers::types::U256;
use std::str::FromStr;

use crate::sandwich::risk::RiskConfig;

pub static PROJECT_NAME: &str = "sandooo_engine";

/// Flashloan fee percentage in basis points (0.09% for Aave V3)
pub static FLASHLOAN_FEE_BASIS_POINTS: u64 = 9;
pub static BASIS_POINTS_DIVISOR: u64 = 10000;

/// MEV transactions bid 20% over the base gas price.
pub static GAS_PRICE_PREMIUM_PERCENT: u64 = 120;

/// Three 12s blocks.
pub static DEFAULT_ORACLE_STALENESS_SECS: u64 = 36;

pub static DEFAULT_MAX_PRICE_IMPACT_BPS: u64 = 100;
pub static DEFAULT_MIN_PROFIT_WEI: u64 = 1;

/// Token decimals assumed by the demo pools.
pub static DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Retrieves the value of an environment variable by key, or returns an empty string if not found.
pub fn get_env(key: &str) -> String {
    std::env::var(key).unwrap_or(String::from(""))
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key);
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| anyhow!("{key}={raw:?}: {e}"))
}

fn parse_env_u256(key: &str) -> Result<Option<U256>> {
    let raw = get_env(key);
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    U256::from_dec_str(raw)
        .map(Some)
        .with_context(|| format!("{key}={raw:?} is not a decimal uint256"))
}

/// Holds all environment configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Env {
    /// Maximum combined front-run + victim price impact, in basis points.
    pub max_price_impact_bps: u64,
    /// Minimum net profit required to settle, in the borrowed token's base units.
    pub min_profit_wei: U256,
    /// Optional cap on the borrowed front-run size.
    pub max_position_wei: Option<U256>,
    /// Optional AMM-vs-oracle deviation bound; enables the oracle sanity check.
    pub max_oracle_deviation_bps: Option<u64>,
    pub oracle_max_staleness_secs: u64,
    pub flashloan_fee_bps: u64,
    /// Optional overall timeout for one attempt.
    pub attempt_timeout_ms: Option<u64>,
    /// CSV file with seed pools for the demo runner.
    pub pools_csv: Option<String>,
    pub debug: bool,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            max_price_impact_bps: DEFAULT_MAX_PRICE_IMPACT_BPS,
            min_profit_wei: U256::from(DEFAULT_MIN_PROFIT_WEI),
            max_position_wei: None,
            max_oracle_deviation_bps: None,
            oracle_max_staleness_secs: DEFAULT_ORACLE_STALENESS_SECS,
            flashloan_fee_bps: FLASHLOAN_FEE_BASIS_POINTS,
            attempt_timeout_ms: None,
            pools_csv: None,
            debug: false,
        }
    }
}

impl Env {
    /// Loads environment variables (after `.env`) and constructs an `Env` instance.
    ///
    /// Unset variables fall back to the defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Env::default();
        let pools_csv = get_env("POOLS_CSV");

        Ok(Env {
            max_price_impact_bps: parse_env("RISK_MAX_PRICE_IMPACT_BPS")?
                .unwrap_or(defaults.max_price_impact_bps),
            min_profit_wei: parse_env_u256("RISK_MIN_PROFIT_WEI")?
                .unwrap_or(defaults.min_profit_wei),
            max_position_wei: parse_env_u256("RISK_MAX_POSITION_WEI")?,
            max_oracle_deviation_bps: parse_env("RISK_MAX_ORACLE_DEVIATION_BPS")?,
            oracle_max_staleness_secs: parse_env("ORACLE_MAX_STALENESS_SECS")?
                .unwrap_or(defaults.oracle_max_staleness_secs),
            flashloan_fee_bps: parse_env("FLASHLOAN_FEE_BPS")?
                .unwrap_or(defaults.flashloan_fee_bps),
            attempt_timeout_ms: parse_env("ATTEMPT_TIMEOUT_MS")?,
            pools_csv: if pools_csv.trim().is_empty() {
                None
            } else {
                Some(pools_csv)
            },
            debug: parse_env("DEBUG")?.unwrap_or(defaults.debug),
        })
    }

    /// Builds the risk limits and rejects impossible ones.
    pub fn risk_config(&self) -> Result<RiskConfig> {
        let config = RiskConfig {
            max_price_impact_bps: self.max_price_impact_bps,
            min_profit_wei: self.min_profit_wei,
            max_position_size: self.max_position_wei,
            max_oracle_deviation_bps: self.max_oracle_deviation_bps,
        };
        config.validate()?;
        Ok(config)
    }
}
