use cosmwasm_std::testing::{mock_env, mock_info};
use cosmwasm_std::Decimal;

use paw_common::keeper::{PawQuery, ValidatorInfo, ValidatorStatus};
use paw_common::mock_querier::mock_dependencies;

use crate::contract::{execute, instantiate, query};
use crate::error::ContractError;
use crate::msg::{ExecuteMsg, InstantiateMsg, ParamsMsg, QueryMsg};
use crate::state::{CircuitBreakerState, Params, PriceFeed};

const OWNER: &str = "paw1owner";
const ASSET: &str = "BTC/USD";

fn validator(addr: &str, power: u64) -> ValidatorInfo {
    ValidatorInfo {
        consensus_addr: addr.to_string(),
        power,
        status: ValidatorStatus::Bonded,
    }
}

fn instantiate_oracle(deps: cosmwasm_std::DepsMut<PawQuery>, params: Option<ParamsMsg>) {
    instantiate(
        deps,
        mock_env(),
        mock_info(OWNER, &[]),
        InstantiateMsg {
            owner: OWNER.to_string(),
            params,
        },
    )
    .unwrap();
}

fn submit(
    deps: cosmwasm_std::DepsMut<PawQuery>,
    validator: &str,
    price: u128,
    nonce: &str,
) -> Result<cosmwasm_std::Response<paw_common::keeper::PawMsg>, ContractError> {
    execute(
        deps,
        mock_env(),
        mock_info(validator, &[]),
        ExecuteMsg::SubmitPrice {
            asset: ASSET.to_string(),
            price: Decimal::from_ratio(price, 1u128),
            nonce: nonce.to_string(),
            geo_region: Some("north_america".to_string()),
        },
    )
}

fn seven_validators() -> Vec<ValidatorInfo> {
    (1..=7).map(|i| validator(&format!("v{i}"), 100)).collect()
}

/// S4: a seventh validator's wild outlier (150000 against a tight cluster at
/// 60000) is rejected outright at submission time (spec.md §4.3 `SubmitPrice`'s
/// own `ErrOutlier` gate), so it never reaches the submission window;
/// aggregation then proceeds on the six honest submitters that did land.
#[test]
fn s4_submit_time_outlier_is_rejected_and_aggregate_publishes_from_honest_six() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(
        deps.as_mut(),
        Some(ParamsMsg {
            min_validators_for_security: Some(6),
            ..Default::default()
        }),
    );

    for i in 1..=6 {
        submit(deps.as_mut(), &format!("v{i}"), 60_000, &format!("n1-{i}")).unwrap();
    }

    let err = submit(deps.as_mut(), "v7", 150_000, "n1-6").unwrap_err();
    assert!(matches!(err, ContractError::OutlierDetected {}));

    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
    )
    .unwrap();

    let feed: PriceFeed = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Feed {
                asset: ASSET.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(feed.sample_count, 6);
    assert_eq!(feed.last_aggregated, Decimal::from_ratio(60_000u128, 1u128));
}

/// With only six submitters (below `min_validators_for_security`), aggregation
/// refuses to publish rather than aggregate on thin data.
#[test]
fn aggregate_rejects_when_below_minimum_validator_count() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(deps.as_mut(), None);

    for i in 1..=6 {
        submit(deps.as_mut(), &format!("v{i}"), 60_000, &format!("n1-{i}")).unwrap();
    }

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::OracleDataUnavailable {}));
}

/// Submissions from an address the staking collaborator does not recognize as
/// a bonded validator are rejected outright.
#[test]
fn submit_price_rejects_unbonded_sender() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(deps.as_mut(), None);

    let err = submit(deps.as_mut(), "not-a-validator", 60_000, "n1").unwrap_err();
    assert!(matches!(err, ContractError::NotValidator {}));
}

/// A replayed nonce for the same asset is rejected even if the price differs.
#[test]
fn submit_price_rejects_replayed_nonce() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(deps.as_mut(), None);

    submit(deps.as_mut(), "v1", 60_000, "dup").unwrap();
    let err = submit(deps.as_mut(), "v1", 61_000, "dup").unwrap_err();
    assert!(matches!(err, ContractError::ReplayedNonce {}));
}

/// A validator who repeatedly fails to contribute a kept submission accrues
/// misses and is eventually slashed once crossing the configured threshold.
#[test]
fn persistent_non_submitter_is_slashed_after_threshold_misses() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(
        deps.as_mut(),
        Some(ParamsMsg {
            slashing_threshold_misses: Some(2),
            min_validators_for_security: Some(6),
            ..Default::default()
        }),
    );

    // Round 0: all seven submit, so v7 is indexed as a known submitter.
    for i in 1..=7 {
        submit(deps.as_mut(), &format!("v{i}"), 60_000, &format!("n_setup-{i}")).unwrap();
    }
    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
    )
    .unwrap();

    // v7 then goes silent; after crossing the miss threshold it is slashed.
    let mut slashed = false;
    for round in 0..3 {
        for i in 1..=6 {
            submit(deps.as_mut(), &format!("v{i}"), 60_000, &format!("n{round}-{i}")).unwrap();
        }
        let res = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(OWNER, &[]),
            ExecuteMsg::AggregatePrice {
                asset: ASSET.to_string(),
            },
        )
        .unwrap();
        if !res.messages.is_empty() {
            slashed = true;
        }
    }
    assert!(slashed, "expected v7 to be slashed for persistent non-submission");
}

/// Governance-gated `UpdateParams` clamps `outlier_std_devs_bps` to its
/// security floor rather than accepting a weaker value.
#[test]
fn update_params_is_owner_gated_and_clamps_security_floor() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(deps.as_mut(), None);

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info("not-owner", &[]),
        ExecuteMsg::UpdateParams {
            patch: ParamsMsg {
                outlier_std_devs_bps: Some(1),
                ..Default::default()
            },
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::Unauthorized {}));

    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::UpdateParams {
            patch: ParamsMsg {
                outlier_std_devs_bps: Some(1),
                ..Default::default()
            },
        },
    )
    .unwrap();

    let params: Params =
        cosmwasm_std::from_json(query(deps.as_ref(), mock_env(), QueryMsg::Params {}).unwrap())
            .unwrap();
    assert_eq!(
        params.outlier_std_devs_bps,
        crate::state::floors::MIN_OUTLIER_STD_DEVS_BPS_FLOOR
    );
}

/// A large aggregated price move trips the asset breaker and blocks further
/// `Price` reads until governance force-resumes it.
#[test]
fn breaker_trips_on_large_move_and_force_resume_clears_it() {
    let mut deps = mock_dependencies(&[]);
    deps.querier.with_validators(&seven_validators());
    instantiate_oracle(deps.as_mut(), None);

    for i in 1..=7 {
        submit(deps.as_mut(), &format!("v{i}"), 60_000, "n0").unwrap();
    }
    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
    )
    .unwrap();

    for i in 1..=7 {
        submit(deps.as_mut(), &format!("v{i}"), 90_000, "n1").unwrap();
    }
    let res = execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::AggregatePrice {
            asset: ASSET.to_string(),
        },
    )
    .unwrap();
    assert!(res
        .events
        .iter()
        .any(|e| e.ty.contains("circuit_breaker_tripped")));

    let breaker: CircuitBreakerState = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Breaker {
                asset: ASSET.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert!(breaker.tripped);

    query(
        deps.as_ref(),
        mock_env(),
        QueryMsg::Price {
            asset: ASSET.to_string(),
        },
    )
    .unwrap_err();

    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(OWNER, &[]),
        ExecuteMsg::ForceResumeAsset {
            asset: ASSET.to_string(),
        },
    )
    .unwrap();

    let breaker: CircuitBreakerState = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Breaker {
                asset: ASSET.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert!(!breaker.tripped);
}

#[test]
fn invariant_reentrancy_guard_rejects_nested_entry() {
    use cosmwasm_std::testing::MockStorage;
    use paw_common::guard::ReentrancyGuard;

    let guard = ReentrancyGuard::new("oracle_reentrancy_lock");
    let mut storage = MockStorage::new();
    guard.enter(&mut storage, ContractError::Reentrancy {}).unwrap();
    let err = guard.enter(&mut storage, ContractError::Reentrancy {}).unwrap_err();
    assert!(matches!(err, ContractError::Reentrancy {}));
    guard.exit(&mut storage).unwrap();
    assert!(guard.enter(&mut storage, ContractError::Reentrancy {}).is_ok());
}
