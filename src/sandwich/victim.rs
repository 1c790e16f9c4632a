use ethers::abi::Token;
use ethers::types::{H160, U256};
use serde::Serialize;

use crate::common::abi::decode_exact_input_swap;
use crate::common::errors::{Result, SandwichError};
use crate::common::routers::is_known_swap_selector;

/// Swap request decoded from pending router calldata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VictimIntent {
    pub token_in: H160,
    pub token_out: H160,
    pub amount_in: U256,
    pub min_amount_out: U256,
    /// Unix seconds.
    pub deadline: U256,
    pub recipient: H160,
}

fn malformed(reason: impl Into<String>) -> SandwichError {
    SandwichError::MalformedVictimTx(reason.into())
}

impl VictimIntent {
    /// Deadline clamped into `u64` seconds.
    pub fn deadline_secs(&self) -> u64 {
        if self.deadline > U256::from(u64::MAX) {
            u64::MAX
        } else {
            self.deadline.as_u64()
        }
    }
}

/// Decodes exact-input V2 router calldata with a direct two-token path.
pub fn decode_victim_tx(data: &[u8]) -> Result<VictimIntent> {
    if data.len() < 4 {
        return Err(malformed(format!(
            "{} bytes of calldata, no selector",
            data.len()
        )));
    }
    let selector: [u8; 4] = [data[0], data[1], data[2], data[3]];
    if !is_known_swap_selector(&selector) {
        return Err(malformed(format!(
            "unsupported selector 0x{}",
            hex::encode(selector)
        )));
    }

    let tokens = decode_exact_input_swap(&data[4..]).map_err(|e| malformed(e.to_string()))?;
    let [amount_in, min_amount_out, path, recipient, deadline]: [Token; 5] = tokens
        .try_into()
        .map_err(|_| malformed("wrong argument count"))?;

    let amount_in = amount_in.into_uint().ok_or_else(|| malformed("amountIn"))?;
    let min_amount_out = min_amount_out
        .into_uint()
        .ok_or_else(|| malformed("amountOutMin"))?;
    let recipient = recipient.into_address().ok_or_else(|| malformed("to"))?;
    let deadline = deadline.into_uint().ok_or_else(|| malformed("deadline"))?;
    let path = path
        .into_array()
        .ok_or_else(|| malformed("path"))?
        .into_iter()
        .map(|t| t.into_address().ok_or_else(|| malformed("path entry")))
        .collect::<Result<Vec<H160>>>()?;

    if path.len() != 2 {
        return Err(malformed(format!(
            "path of {} tokens, only direct swaps are sandwiched",
            path.len()
        )));
    }
    if path[0] == path[1] {
        return Err(malformed("path swaps a token for itself"));
    }
    if amount_in.is_zero() {
        return Err(malformed("zero amountIn"));
    }

    Ok(VictimIntent {
        token_in: path[0],
        token_out: path[1],
        amount_in,
        min_amount_out,
        deadline,
        recipient,
    })
}
