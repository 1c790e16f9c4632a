/// Router ABI fragments used to decode and build victim swap calldata.
///
/// Only the Uniswap V2 style exact-input swaps are modelled:
/// `(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)`.
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Bytes, H160, U256};
use ethers::utils::id;

pub static SWAP_EXACT_TOKENS_FOR_TOKENS: &str =
    "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)";
pub static SWAP_EXACT_TOKENS_FOR_TOKENS_SUPPORTING_FEE: &str =
    "swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)";

/// Argument layout shared by both exact-input router swaps.
pub fn exact_input_swap_params() -> Vec<ParamType> {
    vec![
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Address,
        ParamType::Uint(256),
    ]
}

/// Decodes the arguments following a 4-byte selector.
pub fn decode_exact_input_swap(args: &[u8]) -> Result<Vec<Token>, ethers::abi::Error> {
    decode(&exact_input_swap_params(), args)
}

/// Builds `swapExactTokensForTokens` calldata.
pub fn encode_swap_exact_tokens_for_tokens(
    amount_in: U256,
    amount_out_min: U256,
    path: &[H160],
    to: H160,
    deadline: U256,
) -> Bytes {
    let selector = id(SWAP_EXACT_TOKENS_FOR_TOKENS);
    let args = encode(&[
        Token::Uint(amount_in),
        Token::Uint(amount_out_min),
        Token::Array(path.iter().map(|a| Token::Address(*a)).collect()),
        Token::Address(to),
        Token::Uint(deadline),
    ]);

    let mut calldata = Vec::with_capacity(4 + args.len());
    calldata.extend_from_slice(&selector);
    calldata.extend_from_slice(&args);
    Bytes::from(calldata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_router() {
        let calldata = encode_swap_exact_tokens_for_tokens(
            U256::from(1),
            U256::zero(),
            &[H160::from_low_u64_be(1), H160::from_low_u64_be(2)],
            H160::zero(),
            U256::from(100),
        );
        assert_eq!(&calldata[..4], &[0x38, 0xed, 0x17, 0x39]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let path = [H160::from_low_u64_be(7), H160::from_low_u64_be(8)];
        let calldata = encode_swap_exact_tokens_for_tokens(
            U256::from(1_000),
            U256::from(990),
            &path,
            H160::from_low_u64_be(9),
            U256::from(1_700_000_000u64),
        );
        let tokens = decode_exact_input_swap(&calldata[4..]).unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], Token::Uint(U256::from(1_000)));
        assert_eq!(tokens[3], Token::Address(H160::from_low_u64_be(9)));
    }
}
