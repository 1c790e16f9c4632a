/// Sandwich pricing, flashloan borrowing and the settlement state machine.
///
/// `amm_math` sizes trades, `oracle` sanity-checks pool prices, `flashloan` scopes borrowed
/// capital, and `executor` drives one attempt through `simulation`'s state machine.
pub mod amm_math;
pub mod executor;
pub mod flashloan;
pub mod oracle;
pub mod risk;
pub mod simulation;
pub mod victim;
