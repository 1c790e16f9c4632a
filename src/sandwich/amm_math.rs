/// Constant-product pricing used for sizing and settling every leg.
///
/// All math is integer and rounds down, never in the trader's favor.
use ethers::types::{H160, U256};

use crate::common::constants::BASIS_POINTS_DIVISOR;
use crate::common::errors::{Result, SandwichError};
use crate::common::pools::Pool;

fn checked_mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(SandwichError::ArithmeticOverflow)
}

fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(SandwichError::ArithmeticOverflow)
}

/// Output of selling `amount_in` into a pool, Uniswap V2 style with the fee in basis points.
///
/// `amount_out = amount_in * (10000 - fee) * reserve_out / (reserve_in * 10000 + amount_in * (10000 - fee))`
pub fn quote_out(
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
    fee_bps: u32,
) -> Result<U256> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SandwichError::InvalidPool(format!(
            "empty reserve ({reserve_in}, {reserve_out})"
        )));
    }
    if fee_bps as u64 >= BASIS_POINTS_DIVISOR {
        return Err(SandwichError::InvalidPool(format!("fee {fee_bps} bps")));
    }

    let divisor = U256::from(BASIS_POINTS_DIVISOR);
    let amount_in_with_fee = checked_mul(amount_in, divisor - U256::from(fee_bps))?;
    let numerator = checked_mul(amount_in_with_fee, reserve_out)?;
    let denominator = checked_add(checked_mul(reserve_in, divisor)?, amount_in_with_fee)?;
    Ok(numerator / denominator)
}

/// Price impact of selling `amount_in`, in basis points.
///
/// Marginal price is `reserve_out / reserve_in`, average execution price (fee-free) is
/// `reserve_out / (reserve_in + amount_in)`, so the impact is `amount_in / (reserve_in + amount_in)`.
pub fn price_impact_bps(reserve_in: U256, reserve_out: U256, amount_in: U256) -> Result<u64> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SandwichError::InvalidPool(format!(
            "empty reserve ({reserve_in}, {reserve_out})"
        )));
    }
    if amount_in.is_zero() {
        return Ok(0);
    }

    let numerator = checked_mul(amount_in, U256::from(BASIS_POINTS_DIVISOR))?;
    let denominator = checked_add(reserve_in, amount_in)?;
    // always below 10000
    Ok((numerator / denominator).as_u64())
}

/// Largest front-run such that front-run + victim together stay within `max_impact_bps`.
///
/// `floor(x * 10000 / (r + x)) <= c` holds exactly when `x * (10000 - c - 1) < (c + 1) * r`, so
/// the largest combined size is `((c + 1) * r - 1) / (10000 - c - 1)`. Returns zero when the
/// victim alone already uses the whole budget.
pub fn optimal_frontrun_amount(
    pool: &Pool,
    token_in: H160,
    victim_amount_in: U256,
    max_impact_bps: u64,
) -> Result<U256> {
    if max_impact_bps >= BASIS_POINTS_DIVISOR - 1 {
        return Err(SandwichError::InvalidRiskConfig(format!(
            "impact cap {max_impact_bps} bps admits unbounded trades"
        )));
    }
    let (reserve_in, reserve_out) = pool.reserves_for(token_in)?;
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SandwichError::InvalidPool(format!(
            "pool {:?} has an empty reserve",
            pool.address
        )));
    }

    let cap_plus_one = U256::from(max_impact_bps + 1);
    let numerator = checked_mul(cap_plus_one, reserve_in)? - U256::one();
    let denominator = U256::from(BASIS_POINTS_DIVISOR - max_impact_bps - 1);
    let combined_max = numerator / denominator;

    Ok(combined_max.saturating_sub(victim_amount_in))
}
