/// Leg execution against a working copy of the pool, and the settlement state machine.
use ethers::types::{H160, U256};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

use crate::common::errors::{Result, SandwichError, VictimError};
use crate::common::pools::Pool;
use crate::common::state::Balances;
use crate::sandwich::amm_math::quote_out;
use crate::sandwich::flashloan::{Custody, LoanTerms};
use crate::sandwich::victim::VictimIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LegKind {
    Frontrun,
    Victim,
    Backrun,
}

/// One swap against one pool. Executes fully or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeLeg {
    pub kind: LegKind,
    pub pool: H160,
    pub token_in: H160,
    pub token_out: H160,
    pub amount_in: U256,
    pub amount_out_min: U256,
}

/// Result of an executed leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegFill {
    pub kind: LegKind,
    pub token_in: H160,
    pub token_out: H160,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Pool and balances as the attempt sees them. Discarded on abort.
#[derive(Debug, Clone)]
pub struct WorkingState {
    pub pool: Pool,
    pub balances: Balances,
}

impl WorkingState {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            balances: Balances::new(),
        }
    }

    /// Quotes a swap against the current working reserves without applying it.
    pub fn staticcall(&self, token_in: H160, amount_in: U256) -> Result<U256> {
        let (reserve_in, reserve_out) = self.pool.reserves_for(token_in)?;
        quote_out(reserve_in, reserve_out, amount_in, self.pool.fee_bps)
    }

    /// Executes one of our own legs, paid from the working balances.
    pub fn call(&mut self, leg: &TradeLeg) -> Result<LegFill> {
        let amount_out = self.staticcall(leg.token_in, leg.amount_in)?;
        if amount_out < leg.amount_out_min {
            return Err(SandwichError::LegSlippage {
                expected_min: leg.amount_out_min,
                actual: amount_out,
            });
        }

        let mut balances = self.balances.clone();
        balances.debit(leg.token_in, leg.amount_in)?;
        balances.credit(leg.token_out, amount_out)?;
        let mut pool = self.pool.clone();
        pool.apply_swap(leg.token_in, leg.amount_in, amount_out)?;

        self.balances = balances;
        self.pool = pool;
        Ok(self.fill(leg, amount_out))
    }

    /// Executes the victim's swap with the victim's own funds. Only the pool moves.
    pub fn call_external(&mut self, leg: &TradeLeg) -> Result<LegFill> {
        let amount_out = self.staticcall(leg.token_in, leg.amount_in)?;
        if amount_out < leg.amount_out_min {
            return Err(VictimError::SlippageExceeded {
                expected_min: leg.amount_out_min,
                actual: amount_out,
            }
            .into());
        }
        self.pool
            .apply_swap(leg.token_in, leg.amount_in, amount_out)?;
        Ok(self.fill(leg, amount_out))
    }

    fn fill(&self, leg: &TradeLeg, amount_out: U256) -> LegFill {
        debug!(
            "{:?} leg: {} {:?} -> {} {:?}",
            leg.kind, leg.amount_in, leg.token_in, amount_out, leg.token_out
        );
        LegFill {
            kind: leg.kind,
            token_in: leg.token_in,
            token_out: leg.token_out,
            amount_in: leg.amount_in,
            amount_out,
        }
    }
}

impl Custody for WorkingState {
    fn balance_of(&self, token: H160) -> U256 {
        self.balances.balance_of(token)
    }

    fn credit(&mut self, token: H160, amount: U256) -> Result<()> {
        self.balances.credit(token, amount)
    }

    fn debit(&mut self, token: H160, amount: U256) -> Result<()> {
        self.balances.debit(token, amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptState {
    Idle,
    Sized,
    Borrowed,
    FrontrunDone,
    VictimDone,
    BackrunDone,
    Settled,
    Aborted,
}

impl AttemptState {
    /// The only state reachable from `self` on success.
    pub fn next(self) -> Option<AttemptState> {
        match self {
            AttemptState::Idle => Some(AttemptState::Sized),
            AttemptState::Sized => Some(AttemptState::Borrowed),
            AttemptState::Borrowed => Some(AttemptState::FrontrunDone),
            AttemptState::FrontrunDone => Some(AttemptState::VictimDone),
            AttemptState::VictimDone => Some(AttemptState::BackrunDone),
            AttemptState::BackrunDone => Some(AttemptState::Settled),
            AttemptState::Settled | AttemptState::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Settled | AttemptState::Aborted)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Idle => "idle",
            AttemptState::Sized => "sized",
            AttemptState::Borrowed => "borrowed",
            AttemptState::FrontrunDone => "frontrun_done",
            AttemptState::VictimDone => "victim_done",
            AttemptState::BackrunDone => "backrun_done",
            AttemptState::Settled => "settled",
            AttemptState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Everything recorded about one sandwich while it runs.
#[derive(Debug, Clone)]
pub struct SettlementAttempt {
    pub id: u64,
    pub tag: String,
    state: AttemptState,
    pub intent: Option<VictimIntent>,
    pub frontrun_amount: U256,
    pub loan: Option<LoanTerms>,
    pub legs: Vec<LegFill>,
    pub net_profit: Option<U256>,
}

impl SettlementAttempt {
    pub fn new(id: u64, tag: String) -> Self {
        Self {
            id,
            tag,
            state: AttemptState::Idle,
            intent: None,
            frontrun_amount: U256::zero(),
            loan: None,
            legs: Vec::with_capacity(3),
            net_profit: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Moves to `next`, which must be the successor of the current state.
    pub fn advance(&mut self, next: AttemptState) -> Result<()> {
        if self.state.next() != Some(next) {
            return Err(SandwichError::InvalidTransition(format!(
                "attempt #{} cannot go from {} to {}",
                self.id, self.state, next
            )));
        }
        debug!("[{}] attempt #{}: {} -> {}", self.tag, self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Moves any non-terminal state to `Aborted`.
    pub fn abort(&mut self, reason: &SandwichError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(
            "[{}] attempt #{} aborted in {}: {}",
            self.tag, self.id, self.state, reason
        );
        self.state = AttemptState::Aborted;
    }

    pub fn record_leg(&mut self, fill: LegFill) {
        self.legs.push(fill);
    }
}

/// Success value of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub attempt_id: u64,
    pub pool: H160,
    pub token: H160,
    pub net_profit: U256,
    pub frontrun_amount: U256,
    pub flash_fee: U256,
    pub legs: Vec<LegFill>,
    /// Gas hint with the MEV premium applied.
    pub priority_gas_price: U256,
}
