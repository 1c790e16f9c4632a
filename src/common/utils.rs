/// Utility functions for logging, gas pricing, clocks and log formatting.
use anyhow::Result;
use ethers::types::U256;
use ethers::utils::{format_units, keccak256};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

use crate::common::constants::*;

/// Sets up a colored logger for the project.
///
/// Everything outside this crate logs at `Error`; the crate itself logs at `Info`, or `Debug`
/// when `debug` is set.
pub fn setup_logger(debug: bool) -> Result<()> {
    let colors = ColoredLevelConfig {
        trace: Color::Cyan,
        debug: Color::Magenta,
        info: Color::Green,
        warn: Color::Red,
        error: Color::BrightRed,
        ..ColoredLevelConfig::new()
    };

    let crate_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout())
        .level(LevelFilter::Error)
        .level_for(PROJECT_NAME, crate_level)
        .apply()?;

    Ok(())
}

/// Adds the MEV premium to a base gas price.
///
/// Saturates instead of overflowing; the result is only a bidding hint.
pub fn calculate_optimal_gas_price(base_gas_price: U256) -> U256 {
    base_gas_price.saturating_mul(U256::from(GAS_PRICE_PREMIUM_PERCENT)) / U256::from(100u64)
}

/// Current unix time in seconds.
pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Short identifier for a victim payload, used to tag log lines.
pub fn bundle_id(victim_tx_data: &[u8]) -> String {
    let digest = keccak256(victim_tx_data);
    format!("0x{}", hex::encode(&digest[..4]))
}

/// Formats a base-unit amount with the demo token decimals.
pub fn format_token_amount(amount: U256) -> String {
    format_units(amount, DEFAULT_TOKEN_DECIMALS as u32).unwrap_or_else(|_| amount.to_string())
}
