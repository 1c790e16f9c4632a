/// Shared configuration, error types, pools and settlement state.
pub mod abi;
pub mod constants;
pub mod errors;
pub mod pools;
pub mod routers;
pub mod state;
pub mod utils;
