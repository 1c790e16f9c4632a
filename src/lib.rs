/// Decision and settlement engine for AMM sandwich trades.
///
/// `common` holds shared plumbing (config, errors, pools, working state) and `sandwich` the
/// pricing, borrowing and settlement logic.
pub mod common;
pub mod sandwich;
