use cosmwasm_std::{coin, coins, Addr, Uint128};
use cw_multi_test::{App, ContractWrapper, Executor};

use dex::error::ContractError;
use dex::msg::{ExecuteMsg, InstantiateMsg, ParamsMsg, QueryMsg};
use dex::state::{CircuitBreakerState, Pool};

const OWNER: &str = "owner";
const ALICE: &str = "alice";
const BOB: &str = "bob";

fn mock_app(balances: Vec<(&str, Vec<cosmwasm_std::Coin>)>) -> App {
    App::new(|router, _api, storage| {
        for (addr, coins) in balances {
            router
                .bank
                .init_balance(storage, &Addr::unchecked(addr), coins)
                .unwrap();
        }
    })
}

fn store_dex_code(app: &mut App) -> u64 {
    let contract = Box::new(ContractWrapper::new(
        dex::contract::execute,
        dex::contract::instantiate,
        dex::contract::query,
    ));
    app.store_code(contract)
}

fn instantiate_dex(app: &mut App, owner: &Addr, params: Option<ParamsMsg>) -> Addr {
    let code_id = store_dex_code(app);
    app.instantiate_contract(
        code_id,
        owner.clone(),
        &InstantiateMsg {
            owner: owner.to_string(),
            params,
        },
        &[],
        "dex",
        None,
    )
    .unwrap()
}

fn create_pool(app: &mut App, dex_addr: &Addr, creator: &Addr, a: u128, b: u128) -> u64 {
    let res = app
        .execute_contract(
            creator.clone(),
            dex_addr.clone(),
            &ExecuteMsg::CreatePool {
                token_a: "upaw".to_string(),
                token_b: "uusdt".to_string(),
                amount_a: Uint128::new(a),
                amount_b: Uint128::new(b),
                fee_bps: None,
            },
            &[coin(a, "upaw"), coin(b, "uusdt")],
        )
        .unwrap();
    res.events
        .iter()
        .flat_map(|e| e.attributes.iter())
        .find(|a| a.key == "pool_id")
        .unwrap()
        .value
        .parse()
        .unwrap()
}

/// A full pool lifecycle driven through real `cw-multi-test` message
/// execution across several blocks: creation, a swap, and a partial
/// liquidity removal, checking balances move the way the raw-handler unit
/// tests say the curve should.
#[test]
fn full_pool_lifecycle_create_swap_remove_liquidity_across_blocks() {
    let mut app = mock_app(vec![
        (ALICE, vec![coin(2_000_000, "upaw"), coin(2_000_000, "uusdt")]),
        (BOB, coins(200_000, "upaw")),
    ]);
    let owner = Addr::unchecked(OWNER);
    let alice = Addr::unchecked(ALICE);
    let bob = Addr::unchecked(BOB);

    let dex_addr = instantiate_dex(&mut app, &owner, None);
    let pool_id = create_pool(&mut app, &dex_addr, &alice, 1_000_000, 2_000_000);

    app.update_block(|b| b.height += 1);

    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(100_000),
            min_out: Uint128::new(181_000),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(100_000, "upaw"),
    )
    .unwrap();

    let bob_uusdt = app.wrap().query_balance(bob.as_str(), "uusdt").unwrap();
    assert!(bob_uusdt.amount > Uint128::new(181_000));

    app.update_block(|b| b.height += 1);

    let shares: Uint128 = app
        .wrap()
        .query_wasm_smart(
            &dex_addr,
            &QueryMsg::LpShares {
                pool_id,
                owner: alice.to_string(),
            },
        )
        .unwrap();

    app.execute_contract(
        alice.clone(),
        dex_addr.clone(),
        &ExecuteMsg::RemoveLiquidity {
            pool_id,
            shares: shares.multiply_ratio(1u128, 2u128),
            min_a: Uint128::zero(),
            min_b: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &[],
    )
    .unwrap();

    let remaining: Uint128 = app
        .wrap()
        .query_wasm_smart(
            &dex_addr,
            &QueryMsg::LpShares {
                pool_id,
                owner: alice.to_string(),
            },
        )
        .unwrap();
    assert_eq!(remaining, shares - shares.multiply_ratio(1u128, 2u128));
}

/// S3 across real blocks: a large swap trips the breaker, a swap attempted
/// immediately afterward is rejected outright, a swap placed once the
/// cooldown has elapsed but while still inside the gradual-resume window is
/// capped, and the breaker clears itself once `gradual_until` has passed.
#[test]
fn circuit_breaker_trips_then_gradually_resumes_across_blocks() {
    let mut app = mock_app(vec![
        (ALICE, vec![coin(1_000_000, "upaw"), coin(1_000_000, "uusdt")]),
        (BOB, coins(1_000_000, "upaw")),
    ]);
    let owner = Addr::unchecked(OWNER);
    let alice = Addr::unchecked(ALICE);
    let bob = Addr::unchecked(BOB);

    let dex_addr = instantiate_dex(&mut app, &owner, None);
    let pool_id = create_pool(&mut app, &dex_addr, &alice, 1_000_000, 1_000_000);

    // Moves the price by far more than the 1m/10% threshold, tripping the
    // breaker as a side effect of an otherwise-successful swap.
    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(300_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(300_000, "upaw"),
    )
    .unwrap();

    let breaker: CircuitBreakerState = app
        .wrap()
        .query_wasm_smart(&dex_addr, &QueryMsg::Breaker { pool_id })
        .unwrap();
    assert!(breaker.tripped);

    let err = app
        .execute_contract(
            bob.clone(),
            dex_addr.clone(),
            &ExecuteMsg::Swap {
                pool_id,
                denom_in: "upaw".to_string(),
                amount_in: Uint128::new(1_000),
                min_out: Uint128::zero(),
                deadline: app.block_info().time.seconds() + 60,
            },
            &coins(1_000, "upaw"),
        )
        .unwrap_err();
    assert_eq!(
        err.downcast::<ContractError>().unwrap(),
        ContractError::CircuitBreakerTripped {}
    );

    // Past the cooldown but still inside the gradual-resume window: swaps
    // above the resume-volume cap (50% of reserve_in by default) are rejected.
    app.update_block(|b| b.time = b.time.plus_seconds(150));

    let pool: Pool = app
        .wrap()
        .query_wasm_smart(&dex_addr, &QueryMsg::Pool { pool_id })
        .unwrap();
    let over_cap = pool.reserve_a.multiply_ratio(6u128, 10u128);

    let err = app
        .execute_contract(
            bob.clone(),
            dex_addr.clone(),
            &ExecuteMsg::Swap {
                pool_id,
                denom_in: "upaw".to_string(),
                amount_in: over_cap,
                min_out: Uint128::zero(),
                deadline: app.block_info().time.seconds() + 60,
            },
            &coins(over_cap.u128(), "upaw"),
        )
        .unwrap_err();
    assert_eq!(
        err.downcast::<ContractError>().unwrap(),
        ContractError::PoolDrain {}
    );

    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(1_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(1_000, "upaw"),
    )
    .unwrap();

    // Past `gradual_until`: the next swap clears the breaker entirely.
    app.update_block(|b| b.time = b.time.plus_seconds(3_601));

    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(1_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(1_000, "upaw"),
    )
    .unwrap();

    let breaker: CircuitBreakerState = app
        .wrap()
        .query_wasm_smart(&dex_addr, &QueryMsg::Breaker { pool_id })
        .unwrap();
    assert!(!breaker.tripped);
}

/// The flash-loan heuristic's lockout window, isolated from the price-move
/// breaker by raising the breaker thresholds out of reach for this pool: a
/// large swap is allowed through and flags the sender, a second large swap
/// inside `flash_loan_protection_blocks` is rejected, and one placed after
/// the window has elapsed succeeds.
#[test]
fn flash_loan_guard_locks_out_large_swap_within_protection_window() {
    let mut app = mock_app(vec![
        (ALICE, vec![coin(1_000_000, "upaw"), coin(1_000_000, "uusdt")]),
        (BOB, coins(1_000_000, "upaw")),
    ]);
    let owner = Addr::unchecked(OWNER);
    let alice = Addr::unchecked(ALICE);
    let bob = Addr::unchecked(BOB);

    let dex_addr = instantiate_dex(
        &mut app,
        &owner,
        Some(ParamsMsg {
            breaker_threshold_1m_bps: Some(9_999),
            breaker_threshold_5m_bps: Some(9_999),
            breaker_threshold_15m_bps: Some(9_999),
            breaker_threshold_1h_bps: Some(9_999),
            ..Default::default()
        }),
    );
    let pool_id = create_pool(&mut app, &dex_addr, &alice, 1_000_000, 1_000_000);

    // 15% of reserve_in, above the 10% flash-loan threshold.
    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(150_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(150_000, "upaw"),
    )
    .unwrap();

    let err = app
        .execute_contract(
            bob.clone(),
            dex_addr.clone(),
            &ExecuteMsg::Swap {
                pool_id,
                denom_in: "upaw".to_string(),
                amount_in: Uint128::new(150_000),
                min_out: Uint128::zero(),
                deadline: app.block_info().time.seconds() + 60,
            },
            &coins(150_000, "upaw"),
        )
        .unwrap_err();
    assert_eq!(
        err.downcast::<ContractError>().unwrap(),
        ContractError::FlashLoanLockout {}
    );

    app.update_block(|b| b.height += 11);

    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "upaw".to_string(),
            amount_in: Uint128::new(150_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(150_000, "upaw"),
    )
    .unwrap();
}

/// A resting limit order placed via one message gets filled by a later,
/// unrelated swap message once the pool price crosses its limit — exercised
/// through real `cw-multi-test` routing rather than the raw handler.
#[test]
fn resting_limit_order_fills_through_a_later_swap_message() {
    let mut app = mock_app(vec![
        (ALICE, vec![coin(2_000_000, "upaw"), coin(2_000_000, "uusdt")]),
        (BOB, coins(1_000, "upaw")),
    ]);
    let owner = Addr::unchecked(OWNER);
    let alice = Addr::unchecked(ALICE);
    let bob = Addr::unchecked(BOB);

    let dex_addr = instantiate_dex(&mut app, &owner, None);
    let pool_id = create_pool(&mut app, &dex_addr, &alice, 1_000_000, 2_000_000);

    app.execute_contract(
        bob.clone(),
        dex_addr.clone(),
        &ExecuteMsg::PlaceLimitOrder {
            pool_id,
            side_in: "upaw".to_string(),
            amount_in: Uint128::new(1_000),
            price_limit: cosmwasm_std::Decimal::percent(150),
            expiry: app.block_info().time.seconds() + 3600,
        },
        &coins(1_000, "upaw"),
    )
    .unwrap();

    app.update_block(|b| b.height += 1);

    app.execute_contract(
        alice.clone(),
        dex_addr.clone(),
        &ExecuteMsg::Swap {
            pool_id,
            denom_in: "uusdt".to_string(),
            amount_in: Uint128::new(1_000),
            min_out: Uint128::zero(),
            deadline: app.block_info().time.seconds() + 60,
        },
        &coins(1_000, "uusdt"),
    )
    .unwrap();

    let order: dex::state::LimitOrder = app
        .wrap()
        .query_wasm_smart(&dex_addr, &QueryMsg::LimitOrder { order_id: 0 })
        .unwrap();
    assert!(matches!(order.status, dex::state::LimitOrderStatus::Filled));

    let bob_uusdt = app.wrap().query_balance(bob.as_str(), "uusdt").unwrap();
    assert!(bob_uusdt.amount > Uint128::zero());
}
