use ethers::types::{H160, U256};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sandooo_engine::common::abi::encode_swap_exact_tokens_for_tokens;
use sandooo_engine::common::errors::{ErrorKind, SandwichError, VictimError};
use sandooo_engine::common::pools::{Pool, PoolRegistry};
use sandooo_engine::common::utils::now_unix;
use sandooo_engine::sandwich::executor::SandwichExecutor;
use sandooo_engine::sandwich::flashloan::{FlashLoanHandler, InMemoryLendingPool, LendingFacility};
use sandooo_engine::sandwich::oracle::{ManualFeed, PriceOracle};
use sandooo_engine::sandwich::risk::RiskConfig;
use sandooo_engine::sandwich::simulation::LegKind;

fn token(n: u64) -> H160 {
    H160::from_low_u64_be(n)
}

fn weth() -> H160 {
    token(1)
}

fn usdc() -> H160 {
    token(2)
}

fn e(n: usize) -> U256 {
    U256::exp10(n)
}

fn amount(dec: &str) -> U256 {
    U256::from_dec_str(dec).unwrap()
}

const POOL: u64 = 0x100;

struct Harness {
    executor: Arc<SandwichExecutor>,
    facility: Arc<InMemoryLendingPool>,
    oracle: Arc<PriceOracle>,
    pools: Arc<PoolRegistry>,
}

impl Harness {
    fn new(reserve: U256, fee_bps: u32, risk: RiskConfig) -> Self {
        Self::with_liquidity(reserve, fee_bps, risk, e(27))
    }

    fn with_liquidity(reserve: U256, fee_bps: u32, risk: RiskConfig, liquidity: U256) -> Self {
        let pools = Arc::new(PoolRegistry::new());
        pools
            .insert(Pool::new(token(POOL), weth(), usdc(), reserve, reserve, fee_bps))
            .unwrap();
        let facility = Arc::new(InMemoryLendingPool::new(9));
        facility.deposit(weth(), liquidity).unwrap();
        let oracle = Arc::new(PriceOracle::new(36));
        let executor = SandwichExecutor::new(
            pools.clone(),
            oracle.clone(),
            FlashLoanHandler::new(facility.clone()),
            risk,
        )
        .unwrap();
        Self {
            executor: Arc::new(executor),
            facility,
            oracle,
            pools,
        }
    }

    fn deep() -> Self {
        Self::new(e(24), 0, RiskConfig::default())
    }

    fn pool(&self) -> Pool {
        self.pools.snapshot()[0].clone()
    }

    fn run(&self, frontrun: U256, calldata: &[u8]) -> Result<U256, SandwichError> {
        self.executor
            .execute_sandwich(weth(), usdc(), frontrun, U256::from(30_000_000_000u64), calldata)
            .map(|receipt| receipt.net_profit)
    }

    /// Runs a failing attempt and checks nothing moved.
    fn assert_aborts_cleanly(&self, frontrun: U256, calldata: &[u8]) -> SandwichError {
        let pool_before = self.pool();
        let liquidity_before = self.facility.liquidity(weth());
        let treasury_before = self.executor.treasury();

        let err = self.run(frontrun, calldata).unwrap_err();

        assert_eq!(self.pool(), pool_before);
        assert_eq!(self.facility.liquidity(weth()), liquidity_before);
        assert_eq!(self.executor.treasury(), treasury_before);
        err
    }
}

fn victim_swap(amount_in: U256, min_out: U256) -> Vec<u8> {
    victim_swap_with_deadline(amount_in, min_out, now_unix() + 600)
}

fn victim_swap_with_deadline(amount_in: U256, min_out: U256, deadline: u64) -> Vec<u8> {
    encode_swap_exact_tokens_for_tokens(
        amount_in,
        min_out,
        &[weth(), usdc()],
        token(0xbeef),
        U256::from(deadline),
    )
    .to_vec()
}

#[test]
fn profitable_sandwich_settles_and_repays_the_loan() {
    let h = Harness::deep();
    let k_before = h.pool().k();
    let liquidity_before = h.facility.liquidity(weth());

    let receipt = h
        .executor
        .execute_sandwich(
            weth(),
            usdc(),
            e(21) * U256::from(2),
            U256::from(100),
            &victim_swap(e(21), U256::zero()),
        )
        .unwrap();

    assert_eq!(receipt.net_profit, amount("2190015995920343105"));
    assert_eq!(receipt.flash_fee, amount("1800000000000000000"));
    assert_eq!(
        receipt.legs.iter().map(|l| l.kind).collect::<Vec<_>>(),
        vec![LegKind::Frontrun, LegKind::Victim, LegKind::Backrun]
    );
    assert_eq!(receipt.legs[2].amount_in, receipt.legs[0].amount_out);

    // principal + fee came back
    assert_eq!(
        h.facility.liquidity(weth()),
        liquidity_before + receipt.flash_fee
    );
    assert_eq!(h.executor.treasury_balance(weth()), receipt.net_profit);
    assert_eq!(h.executor.treasury_balance(usdc()), U256::zero());
    assert!(h.pool().k() >= k_before);
}

#[test]
fn thin_pool_is_rejected_not_settled_at_zero() {
    for cap in [100, 9_998] {
        let risk = RiskConfig {
            max_price_impact_bps: cap,
            ..RiskConfig::default()
        };
        let h = Harness::new(U256::from(1_000_000), 0, risk);
        let err = h.assert_aborts_cleanly(e(18) * U256::from(2), &victim_swap(e(18), U256::zero()));
        assert_eq!(
            err,
            SandwichError::PriceImpactExceeded {
                impact_bps: 9_999,
                max_bps: cap
            }
        );
    }
}

#[test]
fn oversized_frontrun_exceeds_price_impact() {
    let h = Harness::new(U256::from(1_000_000), 0, RiskConfig::default());
    let err = h.assert_aborts_cleanly(e(19), &victim_swap(e(18), U256::zero()));
    assert_eq!(err.kind(), ErrorKind::PriceImpactExceeded);
    assert!(err.to_string().starts_with("Price impact too high"));

    let h = Harness::deep();
    let err = h.assert_aborts_cleanly(e(22), &victim_swap(e(21), U256::zero()));
    assert_eq!(
        err,
        SandwichError::PriceImpactExceeded {
            impact_bps: 108,
            max_bps: 100
        }
    );
}

#[test]
fn empty_victim_data_is_malformed() {
    let h = Harness::deep();
    for data in [&b""[..], &[0u8; 3][..], &[0x38, 0xed, 0x17, 0x39][..]] {
        let err = h.assert_aborts_cleanly(e(21), data);
        assert_eq!(err.kind(), ErrorKind::MalformedVictimTx);
    }
}

#[test]
fn unprofitable_sandwich_is_rolled_back() {
    // 0.3% pool fee eats the whole edge
    let h = Harness::new(e(24), 30, RiskConfig::default());
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim_swap(e(21), U256::zero()));
    assert!(err.to_string().starts_with("Insufficient profit"));
    assert_eq!(err.kind(), ErrorKind::InsufficientProfit);

    // victim too small to pay for the flashloan fee
    let h = Harness::deep();
    let err = h.assert_aborts_cleanly(e(20), &victim_swap(e(20), U256::zero()));
    assert_eq!(err.kind(), ErrorKind::InsufficientProfit);
}

#[test]
fn min_profit_threshold_is_enforced() {
    let risk = RiskConfig {
        min_profit_wei: e(19),
        ..RiskConfig::default()
    };
    let h = Harness::new(e(24), 0, risk);
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim_swap(e(21), U256::zero()));
    assert_eq!(
        err,
        SandwichError::InsufficientProfit {
            net_profit: amount("2190015995920343105"),
            min_profit: e(19),
        }
    );
}

#[test]
fn victim_slippage_is_reported_as_victim_failure() {
    let h = Harness::deep();
    // what the victim expects from the untouched pool
    let expected = amount("999000999000999000999");
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim_swap(e(21), expected));

    assert!(err.is_victim_failure());
    match err {
        SandwichError::Victim(VictimError::SlippageExceeded {
            expected_min,
            actual,
        }) => {
            assert_eq!(expected_min, expected);
            assert!(actual < expected);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn past_deadline_aborts_without_side_effects() {
    let h = Harness::deep();
    let err = h.assert_aborts_cleanly(
        e(21) * U256::from(2),
        &victim_swap_with_deadline(e(21), U256::zero(), 1),
    );
    assert!(matches!(
        err,
        SandwichError::DeadlineExceeded { deadline: 1, .. }
    ));
}

#[test]
fn lender_without_liquidity_aborts() {
    let h = Harness::with_liquidity(e(24), 0, RiskConfig::default(), e(21));
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim_swap(e(21), U256::zero()));
    assert_eq!(
        err,
        SandwichError::InsufficientLiquidity {
            token: weth(),
            requested: e(21) * U256::from(2),
            available: e(21),
        }
    );
}

#[test]
fn position_cap_applies_before_borrowing() {
    let risk = RiskConfig {
        max_position_size: Some(e(21)),
        ..RiskConfig::default()
    };
    let h = Harness::new(e(24), 0, risk);
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim_swap(e(21), U256::zero()));
    assert_eq!(err.kind(), ErrorKind::PositionTooLarge);
}

#[test]
fn oracle_check_needs_fresh_feeds() {
    let risk = RiskConfig {
        max_oracle_deviation_bps: Some(50),
        ..RiskConfig::default()
    };
    let h = Harness::new(e(24), 0, risk);
    let victim = victim_swap(e(21), U256::zero());

    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim);
    assert_eq!(err, SandwichError::NoFeedConfigured(weth()));

    h.oracle
        .set_price_feed(weth(), Arc::new(ManualFeed::new(e(8), now_unix() - 600)));
    h.oracle
        .set_price_feed(usdc(), Arc::new(ManualFeed::fresh(e(8))));
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim);
    assert_eq!(err.kind(), ErrorKind::StalePrice);

    // oracle says weth is worth twice as much as the pool does
    h.oracle
        .set_price_feed(weth(), Arc::new(ManualFeed::fresh(e(8) * U256::from(2))));
    let err = h.assert_aborts_cleanly(e(21) * U256::from(2), &victim);
    assert_eq!(err.kind(), ErrorKind::OracleDeviation);

    h.oracle
        .set_price_feed(weth(), Arc::new(ManualFeed::fresh(e(8))));
    assert!(h.run(e(21) * U256::from(2), &victim).is_ok());
}

#[test]
fn optimal_sizing_uses_the_whole_impact_budget() {
    let h = Harness::deep();
    let receipt = h
        .executor
        .execute_optimal_sandwich(weth(), usdc(), U256::zero(), &victim_swap(e(21), U256::zero()))
        .unwrap();

    assert_eq!(receipt.frontrun_amount, amount("9203050813213455904636"));
    assert_eq!(receipt.net_profit, amount("9881221677620722557"));
    assert_eq!(h.executor.treasury_balance(weth()), receipt.net_profit);
}

#[test]
fn optimal_sizing_with_no_room_is_price_impact() {
    let h = Harness::deep();
    let pool_before = h.pool();
    let err = h
        .executor
        .execute_optimal_sandwich(weth(), usdc(), U256::zero(), &victim_swap(e(23), U256::zero()))
        .unwrap_err();
    assert_eq!(
        err,
        SandwichError::PriceImpactExceeded {
            impact_bps: 909,
            max_bps: 100
        }
    );
    assert_eq!(h.pool(), pool_before);
}

#[test]
fn settled_attempts_move_the_pool_for_the_next_one() {
    let h = Harness::deep();
    let first = h.run(e(21) * U256::from(2), &victim_swap(e(21), U256::zero())).unwrap();
    let second = h.run(e(21) * U256::from(2), &victim_swap(e(21), U256::zero())).unwrap();

    assert_ne!(first, second);
    assert_eq!(h.executor.treasury_balance(weth()), first + second);
}

#[test]
fn replacing_a_pool_mid_attempt_keeps_reserves_and_treasury_together() {
    let h = Harness::deep();
    let original = h.pool();
    let settled = {
        let other = Harness::deep();
        other.run(e(21) * U256::from(2), &victim_swap(e(21), U256::zero())).unwrap();
        other.pool()
    };

    let handle = h.pools.get(token(POOL)).unwrap();
    let guard = handle.lock();

    let attempt = {
        let executor = h.executor.clone();
        let calldata = victim_swap(e(21), U256::zero());
        thread::spawn(move || {
            executor
                .execute_sandwich(weth(), usdc(), e(21) * U256::from(2), U256::zero(), &calldata)
                .map(|receipt| receipt.net_profit)
        })
    };
    let replace = {
        let pools = h.pools.clone();
        let replacement = original.clone();
        thread::spawn(move || pools.insert(replacement))
    };
    thread::sleep(Duration::from_millis(50));
    drop(guard);

    let profit = attempt.join().unwrap().unwrap();
    replace.join().unwrap().unwrap();

    assert_eq!(profit, amount("2190015995920343105"));
    assert_eq!(h.executor.treasury_balance(weth()), profit);
    assert!(Arc::ptr_eq(&handle, &h.pools.get(token(POOL)).unwrap()));

    // the replacement lands either before the attempt (which then settles on it) or after its
    // commit; never on a handle the registry no longer serves
    let now = h.pool();
    assert_eq!(*handle.lock(), now);
    assert!(now == settled || now == original, "{now:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_on_one_pool_stay_consistent() {
    let h = Harness::deep();
    let liquidity_before = h.facility.liquidity(weth());
    let k_before = h.pool().k();

    let handles = (0..16u64).map(|i| {
        let executor = h.executor.clone();
        // every fourth victim is garbage
        let calldata = if i % 4 == 3 {
            Vec::new()
        } else {
            victim_swap(e(21), U256::zero())
        };
        tokio::task::spawn_blocking(move || {
            executor.execute_sandwich(weth(), usdc(), e(21) * U256::from(2), U256::zero(), &calldata)
        })
    });

    let mut fees = U256::zero();
    let mut profits = U256::zero();
    let mut ids = Vec::new();
    let mut malformed = 0;
    for outcome in futures::future::join_all(handles).await {
        match outcome.unwrap() {
            Ok(receipt) => {
                assert!(receipt.net_profit > U256::zero());
                fees += receipt.flash_fee;
                profits += receipt.net_profit;
                ids.push(receipt.attempt_id);
            }
            Err(err) => {
                if err.kind() == ErrorKind::MalformedVictimTx {
                    malformed += 1;
                } else {
                    assert_eq!(err.kind(), ErrorKind::InsufficientProfit);
                }
            }
        }
    }

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(malformed, 4);
    assert!(!ids.is_empty());
    assert_eq!(h.facility.liquidity(weth()), liquidity_before + fees);
    assert_eq!(h.executor.treasury_balance(weth()), profits);
    assert!(h.pool().k() >= k_before);
}
