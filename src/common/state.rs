/// Working state for one settlement attempt: token balances and the pool checkpoint.
///
/// Nothing here is visible outside the attempt until [`PoolTransaction::commit`] runs.
use ethers::types::{H160, U256};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

use crate::common::errors::{Result, SandwichError};
use crate::common::pools::Pool;

/// Token balances keyed by token address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances(BTreeMap<H160, U256>);

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: H160) -> U256 {
        self.0.get(&token).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, token: H160, amount: U256) -> Result<()> {
        let balance = self.0.entry(token).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(SandwichError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn debit(&mut self, token: H160, amount: U256) -> Result<()> {
        let available = self.balance_of(token);
        if available < amount {
            return Err(SandwichError::InsufficientBalance {
                token,
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining.is_zero() {
            self.0.remove(&token);
        } else {
            self.0.insert(token, remaining);
        }
        Ok(())
    }

    /// Returns `self` with every balance in `other` added, or fails without touching `self`.
    pub fn merged(&self, other: &Balances) -> Result<Balances> {
        let mut merged = self.clone();
        for (token, amount) in other.iter() {
            merged.credit(token, amount)?;
        }
        Ok(merged)
    }

    /// Non-zero balances in address order.
    pub fn iter(&self) -> impl Iterator<Item = (H160, U256)> + '_ {
        self.0
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(token, amount)| (*token, *amount))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Exclusive checkpoint over one pool.
///
/// `begin` takes the pool lock and records a snapshot. Legs run against a working copy; only
/// `commit` writes back. Dropping the transaction without committing releases the lock with
/// the pool untouched.
pub struct PoolTransaction<'a> {
    guard: MutexGuard<'a, Pool>,
    snapshot: Pool,
    committed: bool,
}

impl<'a> PoolTransaction<'a> {
    pub fn begin(handle: &'a Mutex<Pool>) -> Self {
        let guard = handle.lock();
        let snapshot = guard.clone();
        Self {
            guard,
            snapshot,
            committed: false,
        }
    }

    /// Pool state as of `begin`.
    pub fn snapshot(&self) -> &Pool {
        &self.snapshot
    }

    pub fn working_copy(&self) -> Pool {
        self.snapshot.clone()
    }

    pub fn commit(mut self, pool: Pool) {
        *self.guard = pool;
        self.committed = true;
    }
}

impl Drop for PoolTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("rollback: pool {:?} left at snapshot", self.snapshot.address);
        }
    }
}
