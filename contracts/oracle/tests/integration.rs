use cosmwasm_std::{Addr, Decimal};
use cw_multi_test::{ContractWrapper, Executor};

use oracle::error::ContractError;
use oracle::msg::{ExecuteMsg, InstantiateMsg, ParamsMsg, QueryMsg};
use oracle::state::{CircuitBreakerState, PriceFeed};

use paw_test::{bonded, mock_app, PawApp};

const OWNER: &str = "owner";
const ASSET: &str = "BTC/USD";

fn seven_validators() -> Vec<paw_common::keeper::ValidatorInfo> {
    (1..=7).map(|i| bonded(&format!("v{i}"), 100)).collect()
}

fn store_oracle_code(app: &mut PawApp) -> u64 {
    let contract = Box::new(ContractWrapper::new(
        oracle::contract::execute,
        oracle::contract::instantiate,
        oracle::contract::query,
    ));
    app.store_code(contract)
}

fn instantiate_oracle(app: &mut PawApp, owner: &Addr, params: Option<ParamsMsg>) -> Addr {
    let code_id = store_oracle_code(app);
    app.instantiate_contract(
        code_id,
        owner.clone(),
        &InstantiateMsg {
            owner: owner.to_string(),
            params,
        },
        &[],
        "oracle",
        None,
    )
    .unwrap()
}

fn submit(app: &mut PawApp, oracle_addr: &Addr, validator: &str, price: u128, nonce: &str) {
    app.execute_contract(
        Addr::unchecked(validator),
        oracle_addr.clone(),
        &ExecuteMsg::SubmitPrice {
            asset: ASSET.to_string(),
            price: Decimal::from_ratio(price, 1u128),
            nonce: nonce.to_string(),
            geo_region: Some("north_america".to_string()),
        },
        &[],
    )
    .unwrap();
}

fn aggregate(app: &mut PawApp, oracle_addr: &Addr, owner: &Addr) {
    app.execute_contract(
        owner.clone(),
        oracle_addr.clone(),
        &ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
        &[],
    )
    .unwrap();
}

/// S4 driven across real `cw-multi-test` message routing: a seventh
/// validator's wild outlier is rejected outright at submission (spec.md §4.3
/// `SubmitPrice`'s own `ErrOutlier` gate), so it never joins the window;
/// aggregation then publishes from the six honest validators that landed.
#[test]
fn aggregation_drops_outlier_across_real_validator_set() {
    let mut app = mock_app(&seven_validators());
    let owner = Addr::unchecked(OWNER);
    let oracle_addr = instantiate_oracle(
        &mut app,
        &owner,
        Some(ParamsMsg {
            min_validators_for_security: Some(6),
            ..Default::default()
        }),
    );

    for i in 1..=6 {
        submit(&mut app, &oracle_addr, &format!("v{i}"), 60_000, &format!("n{i}"));
    }

    let err = app
        .execute_contract(
            Addr::unchecked("v7"),
            oracle_addr.clone(),
            &ExecuteMsg::SubmitPrice {
                asset: ASSET.to_string(),
                price: Decimal::from_ratio(150_000u128, 1u128),
                nonce: "n6".to_string(),
                geo_region: Some("north_america".to_string()),
            },
            &[],
        )
        .unwrap_err();
    assert_eq!(
        err.downcast::<ContractError>().unwrap(),
        ContractError::OutlierDetected {}
    );

    app.update_block(|b| b.height += 1);
    aggregate(&mut app, &oracle_addr, &owner);

    let feed: PriceFeed = app
        .wrap()
        .query_wasm_smart(
            &oracle_addr,
            &QueryMsg::Feed {
                asset: ASSET.to_string(),
            },
        )
        .unwrap();
    assert_eq!(feed.sample_count, 6);

    let price: Decimal = app
        .wrap()
        .query_wasm_smart(
            &oracle_addr,
            &QueryMsg::Price {
                asset: ASSET.to_string(),
            },
        )
        .unwrap();
    assert_eq!(price, Decimal::from_ratio(60_000u128, 1u128));
}

/// A validator not present in the mock staking module's bonded set is
/// rejected before the submission is even recorded.
#[test]
fn submit_price_rejects_a_sender_the_staking_module_does_not_recognize() {
    let mut app = mock_app(&seven_validators());
    let owner = Addr::unchecked(OWNER);
    let oracle_addr = instantiate_oracle(&mut app, &owner, None);

    let err = app
        .execute_contract(
            Addr::unchecked("not-a-validator"),
            oracle_addr.clone(),
            &ExecuteMsg::SubmitPrice {
                asset: ASSET.to_string(),
                price: Decimal::from_ratio(60_000u128, 1u128),
                nonce: "n1".to_string(),
                geo_region: Some("north_america".to_string()),
            },
            &[],
        )
        .unwrap_err();
    assert_eq!(
        err.downcast::<ContractError>().unwrap(),
        ContractError::NotValidator {}
    );
}

/// A validator who goes silent across several aggregation rounds accrues
/// misses and, once the configured threshold is crossed, is routed through
/// a real `SlashValidator` message to the staking module — observable via
/// `PawStakingModule::slashes()` the same way `compute`'s dispute-loss
/// integration test observes a provider slash.
#[test]
fn persistent_non_submitter_is_slashed_through_the_staking_module_across_blocks() {
    let mut app = mock_app(&seven_validators());
    let owner = Addr::unchecked(OWNER);
    let oracle_addr = instantiate_oracle(
        &mut app,
        &owner,
        Some(ParamsMsg {
            slashing_threshold_misses: Some(2),
            min_validators_for_security: Some(6),
            ..Default::default()
        }),
    );

    for i in 1..=7 {
        submit(&mut app, &oracle_addr, &format!("v{i}"), 60_000, &format!("n_setup-{i}"));
    }
    app.update_block(|b| b.height += 1);
    aggregate(&mut app, &oracle_addr, &owner);

    for round in 0..3 {
        app.update_block(|b| b.height += 1);
        for i in 1..=6 {
            submit(
                &mut app,
                &oracle_addr,
                &format!("v{i}"),
                60_000,
                &format!("n{round}-{i}"),
            );
        }
        aggregate(&mut app, &oracle_addr, &owner);
    }

    let slashes = app.init_modules(|router, _, _| router.custom.slashes());
    assert!(
        slashes.iter().any(|(addr, _)| addr == "v7"),
        "expected v7 to have been slashed for persistent non-submission, got {slashes:?}"
    );
}

/// A large aggregated price move trips the asset breaker across real blocks;
/// `Price` reads are blocked until governance force-resumes it.
#[test]
fn breaker_trips_on_large_move_and_blocks_price_reads_until_force_resumed() {
    let mut app = mock_app(&seven_validators());
    let owner = Addr::unchecked(OWNER);
    let oracle_addr = instantiate_oracle(&mut app, &owner, None);

    for i in 1..=7 {
        submit(&mut app, &oracle_addr, &format!("v{i}"), 60_000, "n0");
    }
    app.update_block(|b| b.height += 1);
    aggregate(&mut app, &oracle_addr, &owner);

    app.update_block(|b| b.height += 1);
    for i in 1..=7 {
        submit(&mut app, &oracle_addr, &format!("v{i}"), 90_000, "n1");
    }
    aggregate(&mut app, &oracle_addr, &owner);

    let breaker: CircuitBreakerState = app
        .wrap()
        .query_wasm_smart(
            &oracle_addr,
            &QueryMsg::Breaker {
                asset: ASSET.to_string(),
            },
        )
        .unwrap();
    assert!(breaker.tripped);

    app.wrap()
        .query_wasm_smart::<Decimal>(
            &oracle_addr,
            &QueryMsg::Price {
                asset: ASSET.to_string(),
            },
        )
        .unwrap_err();

    app.execute_contract(
        owner.clone(),
        oracle_addr.clone(),
        &ExecuteMsg::ForceResumeAsset {
            asset: ASSET.to_string(),
        },
        &[],
    )
    .unwrap();

    let breaker: CircuitBreakerState = app
        .wrap()
        .query_wasm_smart(
            &oracle_addr,
            &QueryMsg::Breaker {
                asset: ASSET.to_string(),
            },
        )
        .unwrap();
    assert!(!breaker.tripped);
}
