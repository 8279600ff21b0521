#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{to_json_binary, Addr, Binary, Deps, DepsMut, Env, MessageInfo, Order, Response, StdResult};
use cw2::set_contract_version;

use paw_common::common::{claim_ownership, drop_ownership_proposal, propose_new_owner};
use paw_common::event::{attr, ty};
use paw_common::guard::ReentrancyGuard;
use paw_common::keeper::{query_validator, PawMsg, PawQuery, ValidatorStatus};

use crate::defense;
use crate::error::ContractError;
use crate::msg::{ExecuteMsg, InstantiateMsg, MigrateMsg, ParamsMsg, QueryMsg, TwapResponse};
use crate::state::{
    validate_asset, Config, GeoRegion, Params, PriceFeed, CIRCUIT_BREAKERS, CONFIG,
    OWNERSHIP_PROPOSAL, PARAMS, PRICE_FEEDS, SUBMISSIONS, SUBMITTERS_BY_ASSET, VALIDATOR_STATS,
};

const CONTRACT_NAME: &str = "paw-oracle";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry lock for every state-mutating handler (spec.md §4.2, shared pattern
/// with the DEX; see `paw_common::guard`).
const REENTRANCY_GUARD: ReentrancyGuard = ReentrancyGuard::new("oracle_reentrancy_lock");

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut<PawQuery>,
    _env: Env,
    info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response<PawMsg>, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let owner = deps.api.addr_validate(&msg.owner)?;
    CONFIG.save(deps.storage, &Config { owner })?;

    let mut params = Params::default();
    if let Some(patch) = &msg.params {
        params.apply_patch(patch);
    }
    PARAMS.save(deps.storage, &params)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "instantiate")
        .add_attribute(attr::OWNER, info.sender))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    mut deps: DepsMut<PawQuery>,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response<PawMsg>, ContractError> {
    match msg {
        ExecuteMsg::SubmitPrice {
            asset,
            price,
            nonce,
            geo_region,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res =
                execute_submit_price(deps.branch(), &env, &info, asset, price, nonce, geo_region)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::UpdateParams { patch } => execute_update_params(deps, &info, patch),
        ExecuteMsg::ForceResumeAsset { asset } => execute_force_resume_asset(deps, &info, asset),
        ExecuteMsg::AggregatePrice { asset } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_aggregate_price(deps.branch(), &env, asset)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::ProposeNewOwner { owner, expires_in } => {
            let config = CONFIG.load(deps.storage)?;
            propose_new_owner(deps, info, env, owner, expires_in, config.owner, OWNERSHIP_PROPOSAL)
                .map_err(Into::into)
        }
        ExecuteMsg::DropOwnershipProposal {} => {
            let config = CONFIG.load(deps.storage)?;
            drop_ownership_proposal(deps, info, config.owner, OWNERSHIP_PROPOSAL).map_err(Into::into)
        }
        ExecuteMsg::ClaimOwnership {} => {
            claim_ownership(deps, info, env, OWNERSHIP_PROPOSAL, |deps, new_owner| {
                CONFIG.update(deps.storage, |mut c| -> StdResult<_> {
                    c.owner = new_owner;
                    Ok(c)
                })?;
                Ok(())
            })
            .map_err(Into::into)
        }
    }
}

fn parse_geo_region(raw: &str) -> Option<GeoRegion> {
    match raw {
        "north_america" => Some(GeoRegion::NorthAmerica),
        "europe" => Some(GeoRegion::Europe),
        "asia" => Some(GeoRegion::Asia),
        "south_america" => Some(GeoRegion::SouthAmerica),
        "africa" => Some(GeoRegion::Africa),
        "oceania" => Some(GeoRegion::Oceania),
        _ => None,
    }
}

/// Validator submission (spec.md §4.3). Stake weight is never taken from the
/// message: it is read from the staking collaborator's bonded power so a
/// validator cannot inflate its own influence over the aggregate. Shared by
/// the `SubmitPrice` handler and the inbound IBC relay packet handler.
pub(crate) fn apply_price_submission(
    deps: DepsMut<PawQuery>,
    env: &Env,
    sender: &Addr,
    asset: &str,
    price: cosmwasm_std::Decimal,
    nonce: &str,
    geo_region: Option<&str>,
) -> Result<(), ContractError> {
    validate_asset(asset)?;
    if price.is_zero() {
        return Err(ContractError::InvalidPrice {});
    }

    let height = env.block.height;
    let now = env.block.time.seconds();

    defense::assert_submit_rate_allowed(deps.storage, sender, now)?;
    defense::assert_nonce_fresh(deps.storage, asset, nonce, height)?;

    let validator =
        query_validator(&deps.querier, sender.as_str())?.ok_or(ContractError::NotValidator {})?;
    if !matches!(validator.status, ValidatorStatus::Bonded) {
        return Err(ContractError::NotValidator {});
    }
    let stake = cosmwasm_std::Uint128::from(validator.power);

    let params = PARAMS.load(deps.storage)?;
    let known_validators: Vec<Addr> = SUBMITTERS_BY_ASSET
        .prefix(asset)
        .keys(deps.storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<_>>>()?;
    let mut window_prices = Vec::new();
    for other in &known_validators {
        if other == sender {
            continue;
        }
        if let Some(sub) = SUBMISSIONS.may_load(deps.storage, (asset, other))? {
            if height.saturating_sub(sub.height) <= params.max_data_staleness_blocks {
                window_prices.push(sub.price);
            }
        }
    }
    if (window_prices.len() as u32) + 1 >= params.min_validators_for_security {
        defense::assert_not_outlier_vs_window(&window_prices, price, &params)?;
    }

    SUBMISSIONS.save(
        deps.storage,
        (asset, sender),
        &crate::state::ValidatorSubmission {
            price,
            height,
            time: now,
            nonce: nonce.to_string(),
        },
    )?;
    SUBMITTERS_BY_ASSET.save(deps.storage, (asset, sender), &())?;

    let mut stats = VALIDATOR_STATS
        .may_load(deps.storage, (asset, sender))?
        .unwrap_or_default();
    stats.stake = stake;
    stats.last_submitted_height = height;
    if stats.geo_region.is_none() {
        stats.geo_region = geo_region.and_then(parse_geo_region);
    }
    VALIDATOR_STATS.save(deps.storage, (asset, sender), &stats)?;

    Ok(())
}

fn execute_submit_price(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
    asset: String,
    price: cosmwasm_std::Decimal,
    nonce: String,
    geo_region: Option<String>,
) -> Result<Response<PawMsg>, ContractError> {
    apply_price_submission(
        deps,
        env,
        &info.sender,
        &asset,
        price,
        &nonce,
        geo_region.as_deref(),
    )?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "submit_price")
        .add_attribute(attr::ASSET, asset.clone())
        .add_attribute(attr::VALIDATOR, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::PRICE_SUBMITTED)
                .add_attribute(attr::ASSET, asset)
                .add_attribute(attr::VALIDATOR, info.sender.to_string())
                .add_attribute(attr::PRICE, price.to_string()),
        ))
}

/// End-of-block aggregation driver for one asset (spec.md §4.3). Gathers every
/// submission recorded since the previous round, runs the IQR/sigma defense
/// pipeline, updates the published feed and TWAP ring, and applies misses /
/// slashing to validators who did not contribute a kept submission.
fn execute_aggregate_price(
    deps: DepsMut<PawQuery>,
    env: &Env,
    asset: String,
) -> Result<Response<PawMsg>, ContractError> {
    validate_asset(&asset)?;
    let params = PARAMS.load(deps.storage)?;
    let height = env.block.height;
    let now = env.block.time.seconds();

    defense::assert_breaker_allows_publish(deps.storage, &asset, now)?;

    let known_validators: Vec<Addr> = SUBMITTERS_BY_ASSET
        .prefix(asset.as_str())
        .keys(deps.storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<_>>>()?;

    let mut candidates = Vec::new();
    let mut regions = Vec::new();
    for validator in &known_validators {
        let Some(submission) = SUBMISSIONS.may_load(deps.storage, (asset.as_str(), validator))?
        else {
            continue;
        };
        if height.saturating_sub(submission.height) > params.max_data_staleness_blocks {
            continue;
        }
        let stats = VALIDATOR_STATS
            .may_load(deps.storage, (asset.as_str(), validator))?
            .unwrap_or_default();
        regions.push(stats.geo_region.clone());
        candidates.push(defense::Candidate {
            validator: validator.clone(),
            price: submission.price,
            stake: stats.stake,
        });
    }

    if (candidates.len() as u32) < params.min_validators_for_security {
        return Err(ContractError::OracleDataUnavailable {});
    }
    if defense::stake_concentration_bps(&candidates) > params.max_stake_concentration_bps {
        return Err(ContractError::OracleDataUnavailable {});
    }
    if params.enforce_geo_diversity
        && (defense::distinct_regions(&regions) as u32) < params.min_geographic_regions
    {
        return Err(ContractError::OracleDataUnavailable {});
    }

    let outcome = defense::aggregate(candidates, &params);

    let previous = PRICE_FEEDS
        .may_load(deps.storage, asset.as_str())?
        .map(|f| f.last_aggregated)
        .unwrap_or_default();
    let breaker_event =
        defense::maybe_trip_breaker(deps.storage, &asset, &params, now, previous, outcome.price)?;

    PRICE_FEEDS.save(
        deps.storage,
        asset.as_str(),
        &PriceFeed {
            last_aggregated: outcome.price,
            last_height: height,
            last_time: now,
            sample_count: outcome.kept.len() as u32,
        },
    )?;
    defense::init_twap_ring(deps.storage, &asset, params.twap_ring_capacity).ok();
    defense::record_observation(deps.storage, &asset, height, now, outcome.price)?;

    let mut slash_msgs = Vec::new();
    let mut slash_events = Vec::new();
    let kept: std::collections::HashSet<Addr> =
        outcome.kept.iter().map(|c| c.validator.clone()).collect();
    for validator in &known_validators {
        let mut stats = VALIDATOR_STATS
            .may_load(deps.storage, (asset.as_str(), validator))?
            .unwrap_or_default();
        if kept.contains(validator) {
            stats.misses_in_window = 0;
        } else {
            stats.misses_in_window = stats.misses_in_window.saturating_add(1);
        }
        if stats.misses_in_window >= params.slashing_threshold_misses {
            let fraction = defense::slash_fraction(stats.misses_in_window, &params);
            slash_msgs.push(paw_common::keeper::slash_msg(validator.as_str(), fraction));
            slash_events.push(
                cosmwasm_std::Event::new(ty::SLASH_APPLIED)
                    .add_attribute(attr::VALIDATOR, validator.to_string())
                    .add_attribute(attr::SLASH_FRACTION, fraction.to_string()),
            );
            stats.misses_in_window = 0;
        }
        VALIDATOR_STATS.save(deps.storage, (asset.as_str(), validator), &stats)?;
        SUBMISSIONS.remove(deps.storage, (asset.as_str(), validator));
    }

    // Nonce TTL eviction (spec.md §4.5) has no end-of-block hook at the
    // CosmWasm boundary, so it piggybacks on the per-asset aggregation round
    // that already runs regularly, mirroring the compute module's explicit
    // `SweepTimeouts` sweep.
    let swept_nonces = defense::sweep_expired_nonces(
        deps.storage,
        height,
        params.nonce_ttl_blocks,
        params.max_cleanup_per_block as usize,
    )?;

    let mut response = Response::new()
        .add_messages(slash_msgs)
        .add_attribute(attr::ACTION, "aggregate_price")
        .add_attribute(attr::ASSET, asset.clone())
        .add_attribute(attr::PRICE, outcome.price.to_string())
        .add_attribute(attr::SUBMITTER_COUNT, outcome.kept.len().to_string())
        .add_attribute(
            attr::DROPPED_OUTLIERS,
            outcome.dropped_outliers.len().to_string(),
        )
        .add_attribute("swept_nonces", swept_nonces.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::PRICE_AGGREGATED)
                .add_attribute(attr::ASSET, asset.clone())
                .add_attribute(attr::PRICE, outcome.price.to_string()),
        );
    if !outcome.dropped_outliers.is_empty() {
        response = response.add_event(
            cosmwasm_std::Event::new(ty::OUTLIER_REJECTED)
                .add_attribute(attr::ASSET, asset)
                .add_attribute(
                    attr::DROPPED_OUTLIERS,
                    outcome.dropped_outliers.len().to_string(),
                ),
        );
    }
    for event in slash_events {
        response = response.add_event(event);
    }
    if let Some(event) = breaker_event {
        response = response.add_event(event);
    }

    Ok(response)
}

fn execute_update_params(
    deps: DepsMut<PawQuery>,
    info: &MessageInfo,
    patch: ParamsMsg,
) -> Result<Response<PawMsg>, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.owner {
        return Err(ContractError::Unauthorized {});
    }
    let mut params = PARAMS.load(deps.storage)?;
    params.apply_patch(&patch);
    PARAMS.save(deps.storage, &params)?;
    Ok(Response::new().add_attribute(attr::ACTION, "update_params"))
}

fn execute_force_resume_asset(
    deps: DepsMut<PawQuery>,
    info: &MessageInfo,
    asset: String,
) -> Result<Response<PawMsg>, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.owner {
        return Err(ContractError::Unauthorized {});
    }
    defense::force_resume(deps.storage, &asset)?;
    Ok(Response::new()
        .add_attribute(attr::ACTION, "force_resume_asset")
        .add_event(
            cosmwasm_std::Event::new(ty::CIRCUIT_BREAKER_RESUMED).add_attribute(attr::ASSET, asset),
        ))
}

fn to_std_err(e: ContractError) -> cosmwasm_std::StdError {
    cosmwasm_std::StdError::generic_err(e.to_string())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps<PawQuery>, env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Price { asset } => {
            let breaker = CIRCUIT_BREAKERS
                .may_load(deps.storage, asset.as_str())?
                .unwrap_or_default();
            if breaker.tripped && env.block.time.seconds() < breaker.resume_at.unwrap_or(u64::MAX) {
                return Err(to_std_err(ContractError::CircuitBreakerTripped {}));
            }
            let feed = PRICE_FEEDS
                .may_load(deps.storage, asset.as_str())?
                .ok_or_else(|| to_std_err(ContractError::OracleDataUnavailable {}))?;
            to_json_binary(&feed.last_aggregated)
        }
        QueryMsg::Feed { asset } => {
            let feed = PRICE_FEEDS
                .may_load(deps.storage, asset.as_str())?
                .ok_or_else(|| to_std_err(ContractError::OracleDataUnavailable {}))?;
            to_json_binary(&feed)
        }
        QueryMsg::Submission { asset, validator } => {
            let validator = deps.api.addr_validate(&validator)?;
            to_json_binary(&SUBMISSIONS.load(deps.storage, (asset.as_str(), &validator))?)
        }
        QueryMsg::Breaker { asset } => {
            let state = CIRCUIT_BREAKERS
                .may_load(deps.storage, asset.as_str())?
                .unwrap_or_default();
            to_json_binary(&state)
        }
        QueryMsg::Params {} => to_json_binary(&PARAMS.load(deps.storage)?),
        QueryMsg::Twap { asset } => {
            let samples = defense::twap_samples(deps.storage, &asset).map_err(to_std_err)?;
            to_json_binary(&TwapResponse {
                price: defense::twap_price(&samples),
                samples: samples.len() as u32,
            })
        }
    }
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(
    _deps: DepsMut<PawQuery>,
    _env: Env,
    _msg: MigrateMsg,
) -> Result<Response<PawMsg>, ContractError> {
    Ok(Response::new().add_attribute(attr::ACTION, "migrate"))
}
