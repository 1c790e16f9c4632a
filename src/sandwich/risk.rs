use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::common::constants::{
    BASIS_POINTS_DIVISOR, DEFAULT_MAX_PRICE_IMPACT_BPS, DEFAULT_MIN_PROFIT_WEI,
};
use crate::common::errors::{Result, SandwichError};

/// Limits checked before borrowing and after the back-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on the combined front-run + victim price impact.
    pub max_price_impact_bps: u64,
    /// Smallest net profit worth settling.
    pub min_profit_wei: U256,
    /// Largest amount the executor will borrow for one front-run.
    pub max_position_size: Option<U256>,
    /// When set, both pool tokens need fresh feeds and the AMM price must sit within this
    /// many bps of the oracle ratio.
    pub max_oracle_deviation_bps: Option<u64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_price_impact_bps: DEFAULT_MAX_PRICE_IMPACT_BPS,
            min_profit_wei: U256::from(DEFAULT_MIN_PROFIT_WEI),
            max_position_size: None,
            max_oracle_deviation_bps: None,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        // floor(x * 10000 / (r + x)) never reaches 10000, so a cap of 9999 admits every size
        if self.max_price_impact_bps >= BASIS_POINTS_DIVISOR - 1 {
            return Err(SandwichError::InvalidRiskConfig(format!(
                "max_price_impact_bps {} must be below {}",
                self.max_price_impact_bps,
                BASIS_POINTS_DIVISOR - 1
            )));
        }
        if let Some(max) = self.max_position_size {
            if max.is_zero() {
                return Err(SandwichError::InvalidRiskConfig(
                    "max_position_size of zero forbids every trade".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn check_price_impact(&self, impact_bps: u64) -> Result<()> {
        if impact_bps > self.max_price_impact_bps {
            return Err(SandwichError::PriceImpactExceeded {
                impact_bps,
                max_bps: self.max_price_impact_bps,
            });
        }
        Ok(())
    }

    pub fn check_position(&self, amount: U256) -> Result<()> {
        match self.max_position_size {
            Some(max) if amount > max => Err(SandwichError::PositionTooLarge { amount, max }),
            _ => Ok(()),
        }
    }

    /// Returns the net profit `final_balance - owed` if it is positive and meets the minimum.
    pub fn check_profit(&self, final_balance: U256, owed: U256) -> Result<U256> {
        let net_profit = final_balance.checked_sub(owed).unwrap_or_default();
        if net_profit.is_zero() || net_profit < self.min_profit_wei {
            return Err(SandwichError::InsufficientProfit {
                net_profit,
                min_profit: self.min_profit_wei,
            });
        }
        Ok(net_profit)
    }
}
