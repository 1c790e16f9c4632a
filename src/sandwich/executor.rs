/// Sandwich orchestration: decode, size, borrow, run the three legs, then settle or abort.
///
/// An attempt holds its pool's lock from sizing to commit. Legs run against a working copy of
/// the pool and attempt-local balances; the flashloan is repaid out of those balances and only
/// the remaining profit is added to the treasury at commit. Any error drops the working copy,
/// which leaves the pool, the treasury and the lending facility as they were.
use ethers::types::{H160, U256};
use log::info;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::common::errors::{Result, SandwichError};
use crate::common::pools::PoolRegistry;
use crate::common::state::{Balances, PoolTransaction};
use crate::common::utils::{
    bundle_id, calculate_optimal_gas_price, format_token_amount, now_millis, now_unix,
};
use crate::sandwich::amm_math::{optimal_frontrun_amount, price_impact_bps};
use crate::sandwich::flashloan::{Custody, FlashLoanHandler};
use crate::sandwich::oracle::PriceOracle;
use crate::sandwich::risk::RiskConfig;
use crate::sandwich::simulation::{
    AttemptState, LegKind, SettlementAttempt, SettlementReceipt, TradeLeg, WorkingState,
};
use crate::sandwich::victim::{decode_victim_tx, VictimIntent};

/// How the front-run size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontrunSizing {
    /// Caller-supplied amount, checked against the impact cap.
    Fixed(U256),
    /// Largest amount the impact cap allows.
    Optimal,
}

pub struct SandwichExecutor {
    pools: Arc<PoolRegistry>,
    oracle: Arc<PriceOracle>,
    flashloan: FlashLoanHandler,
    risk: RiskConfig,
    attempt_timeout_ms: Option<u64>,
    treasury: Mutex<Balances>,
    next_attempt_id: AtomicU64,
}

impl SandwichExecutor {
    pub fn new(
        pools: Arc<PoolRegistry>,
        oracle: Arc<PriceOracle>,
        flashloan: FlashLoanHandler,
        risk: RiskConfig,
    ) -> Result<Self> {
        risk.validate()?;
        Ok(Self {
            pools,
            oracle,
            flashloan,
            risk,
            attempt_timeout_ms: None,
            treasury: Mutex::new(Balances::new()),
            next_attempt_id: AtomicU64::new(1),
        })
    }

    /// Bounds every attempt's wall-clock time, checked before commit.
    pub fn with_attempt_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.attempt_timeout_ms = timeout_ms;
        self
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    /// Profit retained so far in `token`.
    pub fn treasury_balance(&self, token: H160) -> U256 {
        self.treasury.lock().balance_of(token)
    }

    pub fn treasury(&self) -> Balances {
        self.treasury.lock().clone()
    }

    /// Sandwiches the victim swap in `victim_tx_data` with a caller-sized front-run.
    pub fn execute_sandwich(
        &self,
        token_in: H160,
        token_out: H160,
        frontrun_amount: U256,
        gas_price_hint: U256,
        victim_tx_data: &[u8],
    ) -> Result<SettlementReceipt> {
        self.execute(
            token_in,
            token_out,
            FrontrunSizing::Fixed(frontrun_amount),
            gas_price_hint,
            victim_tx_data,
        )
    }

    /// Sandwiches the victim swap with the largest front-run the impact cap allows.
    pub fn execute_optimal_sandwich(
        &self,
        token_in: H160,
        token_out: H160,
        gas_price_hint: U256,
        victim_tx_data: &[u8],
    ) -> Result<SettlementReceipt> {
        self.execute(
            token_in,
            token_out,
            FrontrunSizing::Optimal,
            gas_price_hint,
            victim_tx_data,
        )
    }

    pub fn execute(
        &self,
        token_in: H160,
        token_out: H160,
        sizing: FrontrunSizing,
        gas_price_hint: U256,
        victim_tx_data: &[u8],
    ) -> Result<SettlementReceipt> {
        let id = self.next_attempt_id.fetch_add(1, Ordering::Relaxed);
        let mut attempt = SettlementAttempt::new(id, bundle_id(victim_tx_data));
        let started_ms = now_millis();

        match self.settle(
            &mut attempt,
            token_in,
            token_out,
            sizing,
            gas_price_hint,
            victim_tx_data,
            started_ms,
        ) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                attempt.abort(&e);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        attempt: &mut SettlementAttempt,
        token_in: H160,
        token_out: H160,
        sizing: FrontrunSizing,
        gas_price_hint: U256,
        victim_tx_data: &[u8],
        started_ms: u64,
    ) -> Result<SettlementReceipt> {
        let intent = decode_victim_tx(victim_tx_data)?;
        if intent.token_in != token_in || intent.token_out != token_out {
            return Err(SandwichError::MalformedVictimTx(format!(
                "victim swaps {:?} -> {:?}, sandwich targets {:?} -> {:?}",
                intent.token_in, intent.token_out, token_in, token_out
            )));
        }
        self.check_deadline(&intent, started_ms)?;
        attempt.intent = Some(intent.clone());

        let (pool_address, handle) = self
            .pools
            .get_pool_by_tokens(token_in, token_out)
            .ok_or_else(|| {
                SandwichError::InvalidPool(format!(
                    "no pool trades {:?} / {:?}",
                    token_in, token_out
                ))
            })?;
        let pool_tx = PoolTransaction::begin(&handle);
        let (reserve_in, reserve_out) = pool_tx.snapshot().reserves_for(token_in)?;

        let frontrun_amount = match sizing {
            FrontrunSizing::Fixed(amount) => amount,
            FrontrunSizing::Optimal => {
                let amount = optimal_frontrun_amount(
                    pool_tx.snapshot(),
                    token_in,
                    intent.amount_in,
                    self.risk.max_price_impact_bps,
                )?;
                if amount.is_zero() {
                    // even one extra unit on top of the victim breaks the cap
                    let smallest = intent
                        .amount_in
                        .checked_add(U256::one())
                        .ok_or(SandwichError::ArithmeticOverflow)?;
                    return Err(SandwichError::PriceImpactExceeded {
                        impact_bps: price_impact_bps(reserve_in, reserve_out, smallest)?,
                        max_bps: self.risk.max_price_impact_bps,
                    });
                }
                amount
            }
        };

        let combined = frontrun_amount
            .checked_add(intent.amount_in)
            .ok_or(SandwichError::ArithmeticOverflow)?;
        self.risk
            .check_price_impact(price_impact_bps(reserve_in, reserve_out, combined)?)?;
        if frontrun_amount.is_zero() {
            return Err(SandwichError::InsufficientProfit {
                net_profit: U256::zero(),
                min_profit: self.risk.min_profit_wei,
            });
        }
        self.risk.check_position(frontrun_amount)?;
        if let Some(max_deviation_bps) = self.risk.max_oracle_deviation_bps {
            self.oracle
                .check_pool_price(pool_tx.snapshot(), token_in, max_deviation_bps)?;
        }
        attempt.frontrun_amount = frontrun_amount;
        attempt.advance(AttemptState::Sized)?;

        let mut working = WorkingState::new(pool_tx.working_copy());
        let (net_profit, flash_fee) = self.flashloan.with_borrowed(
            &mut working,
            token_in,
            frontrun_amount,
            |state, terms| {
                attempt.loan = Some(terms);
                attempt.advance(AttemptState::Borrowed)?;

                let expected = state.staticcall(token_in, frontrun_amount)?;
                let fill = state.call(&TradeLeg {
                    kind: LegKind::Frontrun,
                    pool: pool_address,
                    token_in,
                    token_out,
                    amount_in: frontrun_amount,
                    amount_out_min: expected,
                })?;
                attempt.record_leg(fill);
                attempt.advance(AttemptState::FrontrunDone)?;

                let fill = state.call_external(&TradeLeg {
                    kind: LegKind::Victim,
                    pool: pool_address,
                    token_in,
                    token_out,
                    amount_in: intent.amount_in,
                    amount_out_min: intent.min_amount_out,
                })?;
                attempt.record_leg(fill);
                attempt.advance(AttemptState::VictimDone)?;

                let held = state.balance_of(token_out);
                let expected = state.staticcall(token_out, held)?;
                let fill = state.call(&TradeLeg {
                    kind: LegKind::Backrun,
                    pool: pool_address,
                    token_in: token_out,
                    token_out: token_in,
                    amount_in: held,
                    amount_out_min: expected,
                })?;
                attempt.record_leg(fill);
                attempt.advance(AttemptState::BackrunDone)?;

                let net_profit = self
                    .risk
                    .check_profit(state.balance_of(token_in), terms.owed()?)?;
                self.check_deadline(&intent, started_ms)?;
                Ok((net_profit, terms.fee))
            },
        )?;

        let mut treasury = self.treasury.lock();
        let retained = treasury.merged(&working.balances)?;
        attempt.net_profit = Some(net_profit);
        attempt.advance(AttemptState::Settled)?;
        pool_tx.commit(working.pool);
        *treasury = retained;
        drop(treasury);

        info!(
            "[{}] Settled attempt #{} on {:?}: net profit {} ({})",
            attempt.tag,
            attempt.id,
            pool_address,
            net_profit,
            format_token_amount(net_profit)
        );

        Ok(SettlementReceipt {
            attempt_id: attempt.id,
            pool: pool_address,
            token: token_in,
            net_profit,
            frontrun_amount,
            flash_fee,
            legs: attempt.legs.clone(),
            priority_gas_price: calculate_optimal_gas_price(gas_price_hint),
        })
    }

    fn check_deadline(&self, intent: &VictimIntent, started_ms: u64) -> Result<()> {
        let now = now_unix();
        let deadline = intent.deadline_secs();
        if now > deadline {
            return Err(SandwichError::DeadlineExceeded { deadline, now });
        }
        if let Some(timeout_ms) = self.attempt_timeout_ms {
            let deadline = started_ms.saturating_add(timeout_ms);
            let now = now_millis();
            if now > deadline {
                return Err(SandwichError::DeadlineExceeded { deadline, now });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::abi::encode_swap_exact_tokens_for_tokens;
    use crate::common::pools::Pool;
    use crate::sandwich::flashloan::{InMemoryLendingPool, LendingFacility};

    fn token(n: u64) -> H160 {
        H160::from_low_u64_be(n)
    }

    fn setup() -> (SandwichExecutor, Arc<InMemoryLendingPool>) {
        let pools = Arc::new(PoolRegistry::new());
        pools
            .insert(Pool::new(
                token(100),
                token(1),
                token(2),
                U256::exp10(24),
                U256::exp10(24),
                0,
            ))
            .unwrap();
        let facility = Arc::new(InMemoryLendingPool::new(9));
        facility.deposit(token(1), U256::exp10(26)).unwrap();
        let executor = SandwichExecutor::new(
            pools,
            Arc::new(PriceOracle::default()),
            FlashLoanHandler::new(facility.clone()),
            RiskConfig::default(),
        )
        .unwrap();
        (executor, facility)
    }

    fn victim(amount_in: U256) -> Vec<u8> {
        encode_swap_exact_tokens_for_tokens(
            amount_in,
            U256::zero(),
            &[token(1), token(2)],
            token(9),
            U256::from(now_unix() + 600),
        )
        .to_vec()
    }

    #[test]
    fn settles_profitable_sandwich() {
        let (executor, facility) = setup();
        let receipt = executor
            .execute_sandwich(
                token(1),
                token(2),
                U256::from(2) * U256::exp10(21),
                U256::from(100),
                &victim(U256::exp10(21)),
            )
            .unwrap();

        assert_eq!(
            receipt.net_profit,
            U256::from_dec_str("2190015995920343105").unwrap()
        );
        assert_eq!(receipt.flash_fee, U256::from(18) * U256::exp10(17));
        assert_eq!(receipt.priority_gas_price, U256::from(120));
        assert_eq!(receipt.legs.len(), 3);
        assert_eq!(executor.treasury_balance(token(1)), receipt.net_profit);
        assert_eq!(
            facility.liquidity(token(1)),
            U256::exp10(26) + receipt.flash_fee
        );
    }

    #[test]
    fn mismatched_pair_is_malformed() {
        let (executor, _) = setup();
        let err = executor
            .execute_sandwich(
                token(2),
                token(1),
                U256::exp10(21),
                U256::zero(),
                &victim(U256::exp10(21)),
            )
            .unwrap_err();
        assert!(matches!(err, SandwichError::MalformedVictimTx(_)));
    }

    #[test]
    fn zero_frontrun_is_never_a_success() {
        let (executor, _) = setup();
        let err = executor
            .execute_sandwich(
                token(1),
                token(2),
                U256::zero(),
                U256::zero(),
                &victim(U256::exp10(21)),
            )
            .unwrap_err();
        assert!(matches!(err, SandwichError::InsufficientProfit { .. }));
    }
}
