use lazy_static::lazy_static;
use std::collections::HashSet;

// Swap selectors whose calldata the engine knows how to turn into a victim intent.
lazy_static! {
    pub static ref SWAP_SELECTOR_SET: HashSet<[u8;4]> = {
        let mut set = HashSet::new();
        // Uniswap V2 router
        set.insert([0x38,0xed,0x17,0x39]); // swapExactTokensForTokens
        set.insert([0x5c,0x11,0xd7,0x95]); // swapExactTokensForTokensSupportingFeeOnTransferTokens
        set
    };
}

/// Returns true if the 4-byte selector is an exact-input router swap the engine can decode.
pub fn is_known_swap_selector(selector: &[u8; 4]) -> bool {
    SWAP_SELECTOR_SET.contains(selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::abi::{SWAP_EXACT_TOKENS_FOR_TOKENS, SWAP_EXACT_TOKENS_FOR_TOKENS_SUPPORTING_FEE};
    use ethers::utils::id;

    #[test]
    fn selector_table_matches_signatures() {
        assert!(is_known_swap_selector(&id(SWAP_EXACT_TOKENS_FOR_TOKENS)));
        assert!(is_known_swap_selector(&id(
            SWAP_EXACT_TOKENS_FOR_TOKENS_SUPPORTING_FEE
        )));
        // swapExactETHForTokens
        assert!(!is_known_swap_selector(&[0x7f, 0xf3, 0x6a, 0xb5]));
    }
}
