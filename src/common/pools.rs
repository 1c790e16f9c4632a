/// Constant-product pools and the shared registry the executor settles against.
///
/// Pools are loaded from CSV (or built in code), then held behind one lock each so a settlement
/// attempt owns its pool for the attempt's whole duration.
use anyhow::{Context, Result};
use ethers::types::{H160, U256, U512};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, str::FromStr, sync::Arc};

use crate::common::constants::BASIS_POINTS_DIVISOR;
use crate::common::errors::{Result as SandwichResult, SandwichError};

/// Represents a Uniswap V2 style liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool contract address.
    pub address: H160,
    pub token_a: H160,
    pub token_b: H160,
    pub reserve_a: U256,
    pub reserve_b: U256,
    /// Swap fee in basis points (30 = 0.3%).
    pub fee_bps: u32,
}

impl Pool {
    pub fn new(
        address: H160,
        token_a: H160,
        token_b: H160,
        reserve_a: U256,
        reserve_b: U256,
        fee_bps: u32,
    ) -> Self {
        Self {
            address,
            token_a,
            token_b,
            reserve_a,
            reserve_b,
            fee_bps,
        }
    }

    /// Checks if the pool trades the given token pair, in either direction.
    pub fn trades(&self, token_a: H160, token_b: H160) -> bool {
        let is_a_for_b = self.token_a == token_a && self.token_b == token_b;
        let is_b_for_a = self.token_b == token_a && self.token_a == token_b;
        is_a_for_b || is_b_for_a
    }

    /// The other side of the pair.
    pub fn counterpart(&self, token: H160) -> SandwichResult<H160> {
        if token == self.token_a {
            Ok(self.token_b)
        } else if token == self.token_b {
            Ok(self.token_a)
        } else {
            Err(SandwichError::InvalidPool(format!(
                "{:?} is not traded by pool {:?}",
                token, self.address
            )))
        }
    }

    /// Returns `(reserve_in, reserve_out)` oriented for a swap selling `token_in`.
    pub fn reserves_for(&self, token_in: H160) -> SandwichResult<(U256, U256)> {
        if token_in == self.token_a {
            Ok((self.reserve_a, self.reserve_b))
        } else if token_in == self.token_b {
            Ok((self.reserve_b, self.reserve_a))
        } else {
            Err(SandwichError::InvalidPool(format!(
                "{:?} is not traded by pool {:?}",
                token_in, self.address
            )))
        }
    }

    /// Rejects pools no quote can be computed against.
    pub fn validate(&self) -> SandwichResult<()> {
        if self.token_a == self.token_b {
            return Err(SandwichError::InvalidPool(format!(
                "pool {:?} pairs {:?} with itself",
                self.address, self.token_a
            )));
        }
        if self.reserve_a.is_zero() || self.reserve_b.is_zero() {
            return Err(SandwichError::InvalidPool(format!(
                "pool {:?} has an empty reserve",
                self.address
            )));
        }
        if self.fee_bps as u64 >= BASIS_POINTS_DIVISOR {
            return Err(SandwichError::InvalidPool(format!(
                "pool {:?} fee {} bps is not below 100%",
                self.address, self.fee_bps
            )));
        }
        Ok(())
    }

    /// `reserve_a * reserve_b`, widened so it cannot overflow.
    pub fn k(&self) -> U512 {
        self.reserve_a.full_mul(self.reserve_b)
    }

    /// Moves `amount_in` of `token_in` into the pool and `amount_out` of the other token out.
    pub fn apply_swap(
        &mut self,
        token_in: H160,
        amount_in: U256,
        amount_out: U256,
    ) -> SandwichResult<()> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;
        let new_in = reserve_in
            .checked_add(amount_in)
            .ok_or(SandwichError::ArithmeticOverflow)?;
        if amount_out >= reserve_out {
            return Err(SandwichError::InvalidPool(format!(
                "swap would drain pool {:?}: out {} of reserve {}",
                self.address, amount_out, reserve_out
            )));
        }
        let new_out = reserve_out - amount_out;

        if token_in == self.token_a {
            self.reserve_a = new_in;
            self.reserve_b = new_out;
        } else {
            self.reserve_b = new_in;
            self.reserve_a = new_out;
        }
        Ok(())
    }

    /// Returns a formatted string describing the pool.
    pub fn pretty_msg(&self) -> String {
        format!(
            "[V2 {}bps] {:?}: {:?} ({}) <-> {:?} ({})",
            self.fee_bps, self.address, self.token_a, self.reserve_a, self.token_b, self.reserve_b
        )
    }
}

/// Row layout of a pool seed file. Amounts are decimal strings.
#[derive(Debug, Deserialize)]
struct PoolRow {
    address: String,
    token_a: String,
    token_b: String,
    reserve_a: String,
    reserve_b: String,
    fee_bps: u32,
}

impl TryFrom<PoolRow> for Pool {
    type Error = anyhow::Error;

    fn try_from(row: PoolRow) -> Result<Self> {
        let pool = Pool {
            address: H160::from_str(&row.address)
                .with_context(|| format!("bad pool address {:?}", row.address))?,
            token_a: H160::from_str(&row.token_a)
                .with_context(|| format!("bad token_a {:?}", row.token_a))?,
            token_b: H160::from_str(&row.token_b)
                .with_context(|| format!("bad token_b {:?}", row.token_b))?,
            reserve_a: U256::from_dec_str(&row.reserve_a)
                .with_context(|| format!("bad reserve_a {:?}", row.reserve_a))?,
            reserve_b: U256::from_dec_str(&row.reserve_b)
                .with_context(|| format!("bad reserve_b {:?}", row.reserve_b))?,
            fee_bps: row.fee_bps,
        };
        pool.validate()?;
        Ok(pool)
    }
}

/// Reads pools from a CSV file with header
/// `address,token_a,token_b,reserve_a,reserve_b,fee_bps`.
pub fn load_pools_from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Pool>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open pool file {}", path.display()))?;

    let mut pools = Vec::new();
    for (line, row) in reader.deserialize::<PoolRow>().enumerate() {
        let row = row.with_context(|| format!("{}: row {}", path.display(), line + 1))?;
        pools.push(Pool::try_from(row)?);
    }
    info!("Loaded {} pools from {}", pools.len(), path.display());
    Ok(pools)
}

struct PoolEntry {
    token_a: H160,
    token_b: H160,
    state: Arc<Mutex<Pool>>,
}

/// Shared pool state. Each pool sits behind its own lock; holding it is what makes an attempt
/// exclusive on that pool.
#[derive(Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<H160, PoolEntry>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool. A pool already at that address is overwritten in place behind its own
    /// lock, so the write is ordered with any attempt holding that handle.
    pub fn insert(&self, pool: Pool) -> SandwichResult<()> {
        pool.validate()?;
        let existing = {
            let mut pools = self.pools.write();
            match pools.get_mut(&pool.address) {
                Some(entry) => {
                    entry.token_a = pool.token_a;
                    entry.token_b = pool.token_b;
                    entry.state.clone()
                }
                None => {
                    pools.insert(
                        pool.address,
                        PoolEntry {
                            token_a: pool.token_a,
                            token_b: pool.token_b,
                            state: Arc::new(Mutex::new(pool)),
                        },
                    );
                    return Ok(());
                }
            }
        };
        debug!("Replacing pool {:?} in place", pool.address);
        *existing.lock() = pool;
        Ok(())
    }

    pub fn get(&self, address: H160) -> Option<Arc<Mutex<Pool>>> {
        self.pools
            .read()
            .get(&address)
            .map(|entry| entry.state.clone())
    }

    /// Finds a pool for the pair. When several pools trade it, the lowest address wins so the
    /// choice does not depend on map order.
    pub fn get_pool_by_tokens(
        &self,
        token_a: H160,
        token_b: H160,
    ) -> Option<(H160, Arc<Mutex<Pool>>)> {
        let pools = self.pools.read();
        pools
            .iter()
            .filter(|(_, entry)| {
                (entry.token_a == token_a && entry.token_b == token_b)
                    || (entry.token_a == token_b && entry.token_b == token_a)
            })
            .min_by_key(|(address, _)| **address)
            .map(|(address, entry)| (*address, entry.state.clone()))
    }

    /// Copies every pool, sorted by address. Blocks on pools that are mid-attempt.
    pub fn snapshot(&self) -> Vec<Pool> {
        let handles: Vec<Arc<Mutex<Pool>>> = self
            .pools
            .read()
            .values()
            .map(|entry| entry.state.clone())
            .collect();
        let mut pools: Vec<Pool> = handles.iter().map(|h| h.lock().clone()).collect();
        pools.sort_by_key(|p| p.address);
        pools
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}
