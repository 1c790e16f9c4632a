/// Flashloan borrowing scoped to one settlement attempt.
///
/// Funds come from a [`LendingFacility`] (Aave V3 style: fixed basis-point fee, principal plus
/// fee owed by the end of the attempt). A [`Loan`] is a guard: once taken it is either repaid in
/// full or, when dropped unpaid, its principal goes straight back to the facility.
use ethers::types::{H160, U256};
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

use crate::common::constants::{BASIS_POINTS_DIVISOR, FLASHLOAN_FEE_BASIS_POINTS};
use crate::common::errors::{Result, SandwichError};
use crate::common::state::Balances;

/// External lender the executor borrows working capital from.
pub trait LendingFacility: Send + Sync {
    /// Amount of `token` available to lend right now.
    fn liquidity(&self, token: H160) -> U256;

    /// Fee charged for borrowing `amount` of `token`.
    fn flash_fee(&self, token: H160, amount: U256) -> Result<U256>;

    /// Hands out `amount` of `token`. Fails with `InsufficientLiquidity` if it cannot.
    fn lend(&self, token: H160, amount: U256) -> Result<()>;

    /// Takes `amount` of `token` back into the facility.
    fn collect(&self, token: H160, amount: U256) -> Result<()>;
}

/// Anything that can hold borrowed funds while the legs run.
pub trait Custody {
    fn balance_of(&self, token: H160) -> U256;
    fn credit(&mut self, token: H160, amount: U256) -> Result<()>;
    fn debit(&mut self, token: H160, amount: U256) -> Result<()>;
}

impl Custody for Balances {
    fn balance_of(&self, token: H160) -> U256 {
        Balances::balance_of(self, token)
    }

    fn credit(&mut self, token: H160, amount: U256) -> Result<()> {
        Balances::credit(self, token, amount)
    }

    fn debit(&mut self, token: H160, amount: U256) -> Result<()> {
        Balances::debit(self, token, amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoanTerms {
    pub token: H160,
    pub amount: U256,
    pub fee: U256,
}

impl LoanTerms {
    /// Principal plus fee.
    pub fn owed(&self) -> Result<U256> {
        self.amount
            .checked_add(self.fee)
            .ok_or(SandwichError::ArithmeticOverflow)
    }
}

/// An outstanding flashloan.
#[must_use = "an unpaid loan is unwound when dropped"]
pub struct Loan<'a> {
    facility: &'a dyn LendingFacility,
    terms: LoanTerms,
    settled: bool,
}

impl<'a> Loan<'a> {
    pub fn terms(&self) -> LoanTerms {
        self.terms
    }

    /// Repays the loan. `amount` must be the full principal and `fee` at least the quoted fee.
    pub fn repay(mut self, amount: U256, fee: U256) -> Result<()> {
        let owed = self.terms.owed()?;
        let offered = amount
            .checked_add(fee)
            .ok_or(SandwichError::ArithmeticOverflow)?;
        if amount != self.terms.amount || fee < self.terms.fee {
            return Err(SandwichError::RepaymentShortfall {
                token: self.terms.token,
                owed,
                held: offered,
            });
        }
        self.facility.collect(self.terms.token, offered)?;
        self.settled = true;
        debug!(
            "Repaid flashloan of {} {:?} (+{} fee)",
            self.terms.amount, self.terms.token, fee
        );
        Ok(())
    }
}

impl Drop for Loan<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            "Unwinding unpaid flashloan of {} {:?}",
            self.terms.amount, self.terms.token
        );
        if let Err(e) = self.facility.collect(self.terms.token, self.terms.amount) {
            error!("Flashloan unwind failed: {:?}", e);
        }
    }
}

/// Borrows from one facility on behalf of the executor.
#[derive(Clone)]
pub struct FlashLoanHandler {
    facility: Arc<dyn LendingFacility>,
}

impl FlashLoanHandler {
    pub fn new(facility: Arc<dyn LendingFacility>) -> Self {
        Self { facility }
    }

    pub fn facility(&self) -> &Arc<dyn LendingFacility> {
        &self.facility
    }

    pub fn borrow(&self, token: H160, amount: U256) -> Result<Loan<'_>> {
        let fee = self.facility.flash_fee(token, amount)?;
        self.facility.lend(token, amount)?;
        debug!("Borrowed {} {:?} (fee {})", amount, token, fee);
        Ok(Loan {
            facility: self.facility.as_ref(),
            terms: LoanTerms { token, amount, fee },
            settled: false,
        })
    }

    /// Borrows `amount` of `token` into `custody`, runs `body`, then repays principal + fee out
    /// of `custody`.
    ///
    /// If `body` fails or `custody` cannot cover the repayment, the principal is returned to the
    /// facility and the error comes back. `custody` is left mid-attempt in that case, so callers
    /// pass a working copy they can throw away.
    pub fn with_borrowed<C, T, F>(
        &self,
        custody: &mut C,
        token: H160,
        amount: U256,
        body: F,
    ) -> Result<T>
    where
        C: Custody,
        F: FnOnce(&mut C, LoanTerms) -> Result<T>,
    {
        let loan = self.borrow(token, amount)?;
        let terms = loan.terms();
        custody.credit(token, amount)?;

        let output = body(custody, terms)?;

        let owed = terms.owed()?;
        let held = custody.balance_of(token);
        if held < owed {
            return Err(SandwichError::RepaymentShortfall { token, owed, held });
        }
        custody.debit(token, owed)?;
        loan.repay(terms.amount, terms.fee)?;
        Ok(output)
    }
}

/// Fee in basis points of the borrowed amount, rounded down.
pub fn calculate_flashloan_fee(amount: U256, fee_bps: u64) -> Result<U256> {
    let basis_points = U256::from(fee_bps);
    let divisor = U256::from(BASIS_POINTS_DIVISOR);
    amount
        .checked_mul(basis_points)
        .map(|res| res / divisor)
        .ok_or(SandwichError::ArithmeticOverflow)
}

/// In-process Aave V3 style lending pool.
pub struct InMemoryLendingPool {
    reserves: Mutex<HashMap<H160, U256>>,
    fee_bps: u64,
}

impl Default for InMemoryLendingPool {
    fn default() -> Self {
        Self::new(FLASHLOAN_FEE_BASIS_POINTS)
    }
}

impl InMemoryLendingPool {
    pub fn new(fee_bps: u64) -> Self {
        Self {
            reserves: Mutex::new(HashMap::new()),
            fee_bps,
        }
    }

    pub fn fee_bps(&self) -> u64 {
        self.fee_bps
    }

    pub fn deposit(&self, token: H160, amount: U256) -> Result<()> {
        self.collect(token, amount)
    }
}

impl LendingFacility for InMemoryLendingPool {
    fn liquidity(&self, token: H160) -> U256 {
        self.reserves
            .lock()
            .get(&token)
            .copied()
            .unwrap_or_default()
    }

    fn flash_fee(&self, _token: H160, amount: U256) -> Result<U256> {
        calculate_flashloan_fee(amount, self.fee_bps)
    }

    fn lend(&self, token: H160, amount: U256) -> Result<()> {
        let mut reserves = self.reserves.lock();
        let available = reserves.get(&token).copied().unwrap_or_default();
        if available < amount {
            return Err(SandwichError::InsufficientLiquidity {
                token,
                requested: amount,
                available,
            });
        }
        reserves.insert(token, available - amount);
        Ok(())
    }

    fn collect(&self, token: H160, amount: U256) -> Result<()> {
        let mut reserves = self.reserves.lock();
        let balance = reserves.entry(token).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(SandwichError::ArithmeticOverflow)?;
        Ok(())
    }
}
