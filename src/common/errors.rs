/// Error taxonomy for settlement attempts.
///
/// Every variant is recoverable at the attempt boundary: the attempt is rolled back and
/// exactly one `SandwichError` is handed to the caller.
use ethers::types::{H160, U256};
use thiserror::Error;

/// Failures that originate in the victim's own trade rather than in the executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VictimError {
    /// The victim's swap would return less than its `minAmountOut`.
    #[error("victim slippage exceeded: expected at least {expected_min}, pool returns {actual}")]
    SlippageExceeded {
        /// `minAmountOut` from the victim calldata.
        expected_min: U256,
        /// Output the shifted pool actually returns.
        actual: U256,
    },
}

/// Closed error enumeration for the decision and settlement engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandwichError {
    /// Victim calldata could not be decoded into a swap intent.
    #[error("malformed victim transaction: {0}")]
    MalformedVictimTx(String),

    /// Combined front-run + victim impact is above the configured cap.
    #[error("Price impact too high: {impact_bps} bps > {max_bps} bps")]
    PriceImpactExceeded {
        /// Computed impact.
        impact_bps: u64,
        /// Allowed impact.
        max_bps: u64,
    },

    /// Net profit after repaying the flash loan is below the threshold.
    #[error("Insufficient profit: net {net_profit}, required {min_profit}")]
    InsufficientProfit {
        /// Net profit, zero if the attempt would lose money.
        net_profit: U256,
        /// Configured minimum.
        min_profit: U256,
    },

    /// The lending facility cannot supply the requested amount.
    #[error("insufficient liquidity for {token:?}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        token: H160,
        requested: U256,
        available: U256,
    },

    /// Balance left after the borrowed body ran does not cover principal + fee.
    #[error("repayment shortfall for {token:?}: owed {owed}, held {held}")]
    RepaymentShortfall { token: H160, owed: U256, held: U256 },

    #[error("no price feed configured for {0:?}")]
    NoFeedConfigured(H160),

    #[error("stale price for {token:?}: updated {age_secs}s ago, max {max_age_secs}s")]
    StalePrice {
        token: H160,
        age_secs: u64,
        max_age_secs: u64,
    },

    /// The feed's last round is timestamped after the local clock.
    #[error("price for {token:?} updated at {updated_at}, after now {now}")]
    FuturePriceTimestamp { token: H160, updated_at: u64, now: u64 },

    #[error("invalid pool: {0}")]
    InvalidPool(String),

    /// One of our own legs returns less than its `amount_out_min`.
    #[error("leg slippage exceeded: expected at least {expected_min}, pool returns {actual}")]
    LegSlippage { expected_min: U256, actual: U256 },

    /// The victim deadline or the attempt timeout passed before commit.
    #[error("deadline exceeded: deadline {deadline}, now {now}")]
    DeadlineExceeded { deadline: u64, now: u64 },

    #[error("position too large: {amount} > {max}")]
    PositionTooLarge { amount: U256, max: U256 },

    /// AMM-implied price disagrees with the oracle.
    #[error("oracle deviation for {token:?}: {deviation_bps} bps > {max_bps} bps")]
    OracleDeviation {
        token: H160,
        deviation_bps: u64,
        max_bps: u64,
    },

    #[error("insufficient balance of {token:?}: required {required}, available {available}")]
    InsufficientBalance {
        token: H160,
        required: U256,
        available: U256,
    },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("invalid risk config: {0}")]
    InvalidRiskConfig(String),

    /// A settlement attempt was driven out of order.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// The victim's own transaction failed.
    #[error("victim transaction failed: {0}")]
    Victim(#[from] VictimError),
}

/// Fieldless mirror of [`SandwichError`] used for matching and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedVictimTx,
    PriceImpactExceeded,
    InsufficientProfit,
    InsufficientLiquidity,
    RepaymentShortfall,
    NoFeedConfigured,
    StalePrice,
    FuturePriceTimestamp,
    InvalidPool,
    LegSlippage,
    DeadlineExceeded,
    PositionTooLarge,
    OracleDeviation,
    InsufficientBalance,
    ArithmeticOverflow,
    InvalidRiskConfig,
    InvalidTransition,
    VictimFailed,
}

impl SandwichError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandwichError::MalformedVictimTx(_) => ErrorKind::MalformedVictimTx,
            SandwichError::PriceImpactExceeded { .. } => ErrorKind::PriceImpactExceeded,
            SandwichError::InsufficientProfit { .. } => ErrorKind::InsufficientProfit,
            SandwichError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
            SandwichError::RepaymentShortfall { .. } => ErrorKind::RepaymentShortfall,
            SandwichError::NoFeedConfigured(_) => ErrorKind::NoFeedConfigured,
            SandwichError::StalePrice { .. } => ErrorKind::StalePrice,
            SandwichError::FuturePriceTimestamp { .. } => ErrorKind::FuturePriceTimestamp,
            SandwichError::InvalidPool(_) => ErrorKind::InvalidPool,
            SandwichError::LegSlippage { .. } => ErrorKind::LegSlippage,
            SandwichError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            SandwichError::PositionTooLarge { .. } => ErrorKind::PositionTooLarge,
            SandwichError::OracleDeviation { .. } => ErrorKind::OracleDeviation,
            SandwichError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            SandwichError::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
            SandwichError::InvalidRiskConfig(_) => ErrorKind::InvalidRiskConfig,
            SandwichError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            SandwichError::Victim(_) => ErrorKind::VictimFailed,
        }
    }

    /// True when the failure belongs to the victim's trade, not to the executor.
    pub fn is_victim_failure(&self) -> bool {
        matches!(self, SandwichError::Victim(_))
    }
}

pub type Result<T, E = SandwichError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_strings_are_kept_in_messages() {
        let err = SandwichError::PriceImpactExceeded {
            impact_bps: 9999,
            max_bps: 100,
        };
        assert!(err.to_string().starts_with("Price impact too high"));

        let err = SandwichError::InsufficientProfit {
            net_profit: U256::zero(),
            min_profit: U256::one(),
        };
        assert!(err.to_string().starts_with("Insufficient profit"));
    }

    #[test]
    fn victim_failures_are_distinguishable() {
        let err: SandwichError = VictimError::SlippageExceeded {
            expected_min: U256::from(10),
            actual: U256::from(9),
        }
        .into();
        assert!(err.is_victim_failure());
        assert_eq!(err.kind(), ErrorKind::VictimFailed);
        assert!(!SandwichError::ArithmeticOverflow.is_victim_failure());

        let ours = SandwichError::LegSlippage {
            expected_min: U256::from(10),
            actual: U256::from(9),
        };
        assert!(!ours.is_victim_failure());
        assert_eq!(ours.kind(), ErrorKind::LegSlippage);
    }
}
