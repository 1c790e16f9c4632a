/// Reference prices used to sanity-check a pool before capital is committed.
use ethers::types::{H160, U256, U512};
use log::debug;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

use crate::common::constants::{BASIS_POINTS_DIVISOR, DEFAULT_ORACLE_STALENESS_SECS};
use crate::common::errors::{Result, SandwichError};
use crate::common::pools::Pool;
use crate::common::utils::now_unix;

/// Latest answer of a feed, Chainlink style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundData {
    pub answer: U256,
    /// Unix seconds of the last update.
    pub updated_at: u64,
}

pub trait PriceFeed: Send + Sync {
    fn latest_round(&self) -> Result<RoundData>;
}

/// Feed whose answer is pushed in-process.
#[derive(Debug)]
pub struct ManualFeed {
    round: RwLock<RoundData>,
}

impl ManualFeed {
    pub fn new(answer: U256, updated_at: u64) -> Self {
        Self {
            round: RwLock::new(RoundData { answer, updated_at }),
        }
    }

    /// A feed updated right now.
    pub fn fresh(answer: U256) -> Self {
        Self::new(answer, now_unix())
    }

    pub fn push(&self, answer: U256, updated_at: u64) {
        *self.round.write() = RoundData { answer, updated_at };
    }
}

impl PriceFeed for ManualFeed {
    fn latest_round(&self) -> Result<RoundData> {
        Ok(*self.round.read())
    }
}

pub struct PriceOracle {
    feeds: RwLock<HashMap<H160, Arc<dyn PriceFeed>>>,
    max_staleness_secs: u64,
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_STALENESS_SECS)
    }
}

impl PriceOracle {
    pub fn new(max_staleness_secs: u64) -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            max_staleness_secs,
        }
    }

    /// Registers the feed for `token`; the last registration wins.
    pub fn set_price_feed(&self, token: H160, feed: Arc<dyn PriceFeed>) {
        self.feeds.write().insert(token, feed);
    }

    pub fn has_feed(&self, token: H160) -> bool {
        self.feeds.read().contains_key(&token)
    }

    pub fn get_price(&self, token: H160) -> Result<U256> {
        let feed = self
            .feeds
            .read()
            .get(&token)
            .cloned()
            .ok_or(SandwichError::NoFeedConfigured(token))?;

        let round = feed.latest_round()?;
        let now = now_unix();
        if round.updated_at > now {
            return Err(SandwichError::FuturePriceTimestamp {
                token,
                updated_at: round.updated_at,
                now,
            });
        }
        let age_secs = now - round.updated_at;
        if age_secs > self.max_staleness_secs {
            return Err(SandwichError::StalePrice {
                token,
                age_secs,
                max_age_secs: self.max_staleness_secs,
            });
        }
        Ok(round.answer)
    }

    /// Compares the pool's marginal price for selling `token_in` with the oracle ratio.
    ///
    /// Deviation is `|r_out * p_out - r_in * p_in| / (r_in * p_in)` in basis points. A zero
    /// oracle price counts as unbounded deviation.
    pub fn check_pool_price(
        &self,
        pool: &Pool,
        token_in: H160,
        max_deviation_bps: u64,
    ) -> Result<u64> {
        let token_out = pool.counterpart(token_in)?;
        let price_in = self.get_price(token_in)?;
        let price_out = self.get_price(token_out)?;
        let (reserve_in, reserve_out) = pool.reserves_for(token_in)?;

        let oracle_side = reserve_in.full_mul(price_in);
        let amm_side = reserve_out.full_mul(price_out);

        let deviation_bps = if oracle_side.is_zero() || amm_side.is_zero() {
            u64::MAX
        } else {
            let diff = if amm_side > oracle_side {
                amm_side - oracle_side
            } else {
                oracle_side - amm_side
            };
            let bps = diff.saturating_mul(U512::from(BASIS_POINTS_DIVISOR)) / oracle_side;
            if bps > U512::from(u64::MAX) {
                u64::MAX
            } else {
                bps.low_u64()
            }
        };

        debug!(
            "Oracle check {:?}: deviation {} bps (max {})",
            pool.address, deviation_bps, max_deviation_bps
        );
        if deviation_bps > max_deviation_bps {
            return Err(SandwichError::OracleDeviation {
                token: token_in,
                deviation_bps,
                max_bps: max_deviation_bps,
            });
        }
        Ok(deviation_bps)
    }
}
