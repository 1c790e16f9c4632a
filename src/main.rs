//! sandooo-engine: replays a batch of victim swaps through the sandwich executor
use anyhow::Result;
use colored::Colorize;
use dotenv::dotenv;
use ethers::types::{Bytes, H160, U256};
use log::{info, warn};
use std::{collections::HashMap, sync::Arc};

use sandooo_engine::common::abi::encode_swap_exact_tokens_for_tokens;
use sandooo_engine::common::constants::Env;
use sandooo_engine::common::errors::ErrorKind;
use sandooo_engine::common::pools::{load_pools_from_csv, Pool, PoolRegistry};
use sandooo_engine::common::utils::{format_token_amount, now_unix, setup_logger};
use sandooo_engine::sandwich::executor::{FrontrunSizing, SandwichExecutor};
use sandooo_engine::sandwich::flashloan::{FlashLoanHandler, InMemoryLendingPool};
use sandooo_engine::sandwich::oracle::{ManualFeed, PriceOracle};

/// Base gas price hint handed to every attempt (30 gwei).
const BASE_GAS_PRICE_WEI: u64 = 30_000_000_000;

fn demo_pools() -> Vec<Pool> {
    let weth = H160::from_low_u64_be(0xee);
    let usdc = H160::from_low_u64_be(0xa0);
    let dai = H160::from_low_u64_be(0x6b);
    vec![
        Pool::new(
            H160::from_low_u64_be(0x1001),
            weth,
            usdc,
            U256::exp10(24),
            U256::exp10(24),
            0,
        ),
        Pool::new(
            H160::from_low_u64_be(0x1002),
            weth,
            dai,
            U256::from(5) * U256::exp10(24),
            U256::from(5) * U256::exp10(24),
            30,
        ),
    ]
}

struct Job {
    token_in: H160,
    token_out: H160,
    sizing: FrontrunSizing,
    calldata: Bytes,
}

/// A few victims per pool: a large swap, a small one, one with tight slippage, and garbage.
fn demo_jobs(pools: &[Pool]) -> Vec<Job> {
    let deadline = U256::from(now_unix() + 600);
    let recipient = H160::from_low_u64_be(0xbeef);
    let mut jobs = Vec::new();

    for pool in pools {
        let path = [pool.token_a, pool.token_b];
        let large = U256::exp10(21);
        let small = U256::exp10(20);

        jobs.push(Job {
            token_in: pool.token_a,
            token_out: pool.token_b,
            sizing: FrontrunSizing::Fixed(large * U256::from(2)),
            calldata: encode_swap_exact_tokens_for_tokens(
                large,
                U256::zero(),
                &path,
                recipient,
                deadline,
            ),
        });
        jobs.push(Job {
            token_in: pool.token_a,
            token_out: pool.token_b,
            sizing: FrontrunSizing::Optimal,
            calldata: encode_swap_exact_tokens_for_tokens(
                large,
                U256::zero(),
                &path,
                recipient,
                deadline,
            ),
        });
        jobs.push(Job {
            token_in: pool.token_a,
            token_out: pool.token_b,
            sizing: FrontrunSizing::Fixed(small * U256::from(2)),
            calldata: encode_swap_exact_tokens_for_tokens(
                small,
                U256::zero(),
                &path,
                recipient,
                deadline,
            ),
        });
        jobs.push(Job {
            token_in: pool.token_a,
            token_out: pool.token_b,
            sizing: FrontrunSizing::Fixed(large),
            calldata: encode_swap_exact_tokens_for_tokens(
                large,
                large,
                &path,
                recipient,
                deadline,
            ),
        });
        jobs.push(Job {
            token_in: pool.token_a,
            token_out: pool.token_b,
            sizing: FrontrunSizing::Fixed(large),
            calldata: Bytes::new(),
        });
    }
    jobs
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let env = Env::from_env()?;
    setup_logger(env.debug)?;

    info!("Starting sandooo-engine");
    let risk = env.risk_config()?;
    info!("{:?}", risk);

    let pools = match &env.pools_csv {
        Some(path) => load_pools_from_csv(path)?,
        None => demo_pools(),
    };

    let registry = Arc::new(PoolRegistry::new());
    let oracle = Arc::new(PriceOracle::new(env.oracle_max_staleness_secs));
    let facility = Arc::new(InMemoryLendingPool::new(env.flashloan_fee_bps));
    for pool in &pools {
        info!("{}", pool.pretty_msg());
        registry.insert(pool.clone())?;
        for token in [pool.token_a, pool.token_b] {
            if !oracle.has_feed(token) {
                oracle.set_price_feed(token, Arc::new(ManualFeed::fresh(U256::exp10(8))));
                facility.deposit(token, U256::exp10(27))?;
            }
        }
    }

    let executor = Arc::new(
        SandwichExecutor::new(
            registry.clone(),
            oracle,
            FlashLoanHandler::new(facility),
            risk,
        )?
        .with_attempt_timeout(env.attempt_timeout_ms),
    );

    let jobs = demo_jobs(&pools);
    info!("Replaying {} victim transactions", jobs.len());

    let handles = jobs.into_iter().map(|job| {
        let executor = executor.clone();
        tokio::task::spawn_blocking(move || {
            executor.execute(
                job.token_in,
                job.token_out,
                job.sizing,
                U256::from(BASE_GAS_PRICE_WEI),
                &job.calldata,
            )
        })
    });

    let mut settled = 0usize;
    let mut aborted: HashMap<ErrorKind, usize> = HashMap::new();
    for outcome in futures::future::join_all(handles).await {
        match outcome? {
            Ok(receipt) => {
                settled += 1;
                info!("{}", serde_json::to_string(&receipt)?);
            }
            Err(e) => {
                *aborted.entry(e.kind()).or_default() += 1;
                if e.is_victim_failure() {
                    warn!("Victim failed on its own: {}", e);
                }
            }
        }
    }

    info!(
        "{}",
        format!("Settled {} attempts, aborted {:?}", settled, aborted).bold()
    );
    for (token, amount) in executor.treasury().iter() {
        info!(
            "{}",
            format!("Treasury {:?}: {}", token, format_token_amount(amount)).green()
        );
    }
    for pool in registry.snapshot() {
        info!("{}", pool.pretty_msg());
    }

    Ok(())
}
