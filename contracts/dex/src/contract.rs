#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    to_json_binary, Binary, Decimal, Deps, DepsMut, Env, MessageInfo, Order, Response, StdError,
    StdResult, Uint128,
};
use cw2::set_contract_version;
use cw_storage_plus::Bound;

use paw_common::asset::{assert_funds_exactly, Asset};
use paw_common::common::{claim_ownership, drop_ownership_proposal, propose_new_owner};
use paw_common::event::{attr, ty};
use paw_common::guard::ReentrancyGuard;
use paw_common::pagination::clamp_limit;

use crate::defense;
use crate::error::ContractError;
use crate::math;
use crate::msg::{
    ExecuteMsg, InstantiateMsg, MigrateMsg, ParamsMsg, PoolsResponse, QueryMsg,
    SimulateSwapResponse, TwapResponse,
};
use crate::state::{
    Config, LimitOrder, LimitOrderSide, LimitOrderStatus, Params, Pool, PoolStatus,
    CIRCUIT_BREAKERS, CONFIG, LIMIT_ORDERS, LP_SHARES, NEXT_ORDER_ID, NEXT_POOL_ID,
    ORDERS_BY_EXPIRY, ORDERS_BY_POOL, OWNERSHIP_PROPOSAL, PARAMS, POOLS, POOL_BY_PAIR,
};

const CONTRACT_NAME: &str = "paw-dex";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry lock for every state-mutating handler (spec.md §4.2 "Reentrancy guard").
const REENTRANCY_GUARD: ReentrancyGuard = ReentrancyGuard::new("dex_reentrancy_lock");

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let owner = deps.api.addr_validate(&msg.owner)?;
    CONFIG.save(deps.storage, &Config { owner })?;

    let mut params = Params::default();
    if let Some(patch) = &msg.params {
        params.apply_patch(patch);
    }
    PARAMS.save(deps.storage, &params)?;

    NEXT_POOL_ID.save(deps.storage, &0)?;
    NEXT_ORDER_ID.save(deps.storage, &0)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "instantiate")
        .add_attribute(attr::OWNER, info.sender))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    mut deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::CreatePool {
            token_a,
            token_b,
            amount_a,
            amount_b,
            fee_bps,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_create_pool(
                deps.branch(),
                &env,
                &info,
                token_a,
                token_b,
                amount_a,
                amount_b,
                fee_bps,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::AddLiquidity {
            pool_id,
            max_a,
            max_b,
            min_shares,
            deadline,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_add_liquidity(
                deps.branch(),
                &env,
                &info,
                pool_id,
                max_a,
                max_b,
                min_shares,
                deadline,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::RemoveLiquidity {
            pool_id,
            shares,
            min_a,
            min_b,
            deadline,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_remove_liquidity(
                deps.branch(),
                &env,
                &info,
                pool_id,
                shares,
                min_a,
                min_b,
                deadline,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::Swap {
            pool_id,
            denom_in,
            amount_in,
            min_out,
            deadline,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_swap(
                deps.branch(),
                &env,
                &info,
                pool_id,
                denom_in,
                amount_in,
                min_out,
                deadline,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::PlaceLimitOrder {
            pool_id,
            side_in,
            amount_in,
            price_limit,
            expiry,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_place_limit_order(
                deps.branch(),
                &env,
                &info,
                pool_id,
                side_in,
                amount_in,
                price_limit,
                expiry,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::CancelLimitOrder { order_id } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_cancel_limit_order(deps.branch(), &info, order_id)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::SweepExpiredOrders {} => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_sweep_expired_orders(deps.branch(), &env)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::UpdateParams { patch } => execute_update_params(deps, &info, patch),
        ExecuteMsg::ForceResumePool { pool_id } => execute_force_resume_pool(deps, &info, pool_id),
        ExecuteMsg::ProposeNewOwner { owner, expires_in } => {
            let config = CONFIG.load(deps.storage)?;
            propose_new_owner(deps, info, env, owner, expires_in, config.owner, OWNERSHIP_PROPOSAL)
                .map_err(Into::into)
        }
        ExecuteMsg::DropOwnershipProposal {} => {
            let config = CONFIG.load(deps.storage)?;
            drop_ownership_proposal(deps, info, config.owner, OWNERSHIP_PROPOSAL)
                .map_err(Into::into)
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

fn next_pool_id(deps: &mut DepsMut) -> StdResult<u64> {
    let id = NEXT_POOL_ID.load(deps.storage)?;
    NEXT_POOL_ID.save(deps.storage, &(id + 1))?;
    Ok(id)
}

fn next_order_id(deps: &mut DepsMut) -> StdResult<u64> {
    let id = NEXT_ORDER_ID.load(deps.storage)?;
    NEXT_ORDER_ID.save(deps.storage, &(id + 1))?;
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
fn execute_create_pool(
    mut deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    token_a: String,
    token_b: String,
    amount_a: Uint128,
    amount_b: Uint128,
    fee_bps: Option<u16>,
) -> Result<Response, ContractError> {
    if amount_a.is_zero() || amount_b.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }

    let raw_a = paw_common::asset::Denom::new(token_a)?;
    let raw_b = paw_common::asset::Denom::new(token_b)?;
    let (denom_a, denom_b) = paw_common::asset::canonical_order(raw_a, raw_b);

    let pair_key = (denom_a.as_str().to_string(), denom_b.as_str().to_string());
    if POOL_BY_PAIR.has(deps.storage, pair_key.clone()) {
        return Err(ContractError::DuplicatePool {});
    }

    let params = PARAMS.load(deps.storage)?;
    let pool_count = POOLS
        .range(deps.storage, None, None, Order::Ascending)
        .count() as u64;
    if pool_count >= params.max_pools {
        return Err(ContractError::TooManyPools {});
    }

    assert_funds_exactly(
        info,
        &[
            Asset::new(denom_a.clone(), amount_a),
            Asset::new(denom_b.clone(), amount_b),
        ],
    )?;

    let total_shares = math::initial_shares(amount_a, amount_b);
    if total_shares <= paw_common::asset::MINIMUM_LIQUIDITY {
        return Err(ContractError::MinimumLiquidityAmountError {});
    }
    let creator_shares = total_shares - paw_common::asset::MINIMUM_LIQUIDITY;

    let pool_id = next_pool_id(&mut deps)?;
    let pool = Pool {
        id: pool_id,
        token_a: denom_a,
        token_b: denom_b,
        reserve_a: amount_a,
        reserve_b: amount_b,
        total_shares,
        fee_bps: fee_bps.unwrap_or(params.default_fee_bps),
        creator: info.sender.clone(),
        created_height: env.block.height,
        status: PoolStatus::Active,
    };

    POOLS.save(deps.storage, pool_id, &pool)?;
    POOL_BY_PAIR.save(deps.storage, pair_key, &pool_id)?;
    LP_SHARES.save(deps.storage, (pool_id, &info.sender), &creator_shares)?;
    CIRCUIT_BREAKERS.save(deps.storage, pool_id, &Default::default())?;
    defense::init_twap_ring(deps.storage, pool_id, params.twap_ring_capacity)?;
    defense::record_observation(
        deps.storage,
        pool_id,
        env.block.height,
        env.block.time.seconds(),
        amount_a,
        amount_b,
    )?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "create_pool")
        .add_attribute(attr::POOL_ID, pool_id.to_string())
        .add_attribute(attr::OWNER, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::POOL_CREATED)
                .add_attribute(attr::POOL_ID, pool_id.to_string()),
        ))
}

#[allow(clippy::too_many_arguments)]
fn execute_add_liquidity(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    pool_id: u64,
    max_a: Uint128,
    max_b: Uint128,
    min_shares: Uint128,
    deadline: u64,
) -> Result<Response, ContractError> {
    assert_deadline(env, deadline)?;

    let mut pool = POOLS
        .may_load(deps.storage, pool_id)?
        .ok_or(ContractError::PoolNotFound { pool_id })?;

    assert_funds_exactly(
        info,
        &[
            Asset::new(pool.token_a.clone(), max_a),
            Asset::new(pool.token_b.clone(), max_b),
        ],
    )?;

    let (deposit_a, deposit_b, shares_minted) = math::balanced_deposit(
        pool.reserve_a,
        pool.reserve_b,
        pool.total_shares,
        max_a,
        max_b,
    )?;
    if shares_minted < min_shares {
        return Err(ContractError::Slippage {});
    }

    pool.reserve_a += deposit_a;
    pool.reserve_b += deposit_b;
    pool.total_shares += shares_minted;
    POOLS.save(deps.storage, pool_id, &pool)?;

    let existing = LP_SHARES
        .may_load(deps.storage, (pool_id, &info.sender))?
        .unwrap_or_default();
    LP_SHARES.save(
        deps.storage,
        (pool_id, &info.sender),
        &(existing + shares_minted),
    )?;

    defense::record_observation(
        deps.storage,
        pool_id,
        env.block.height,
        env.block.time.seconds(),
        pool.reserve_a,
        pool.reserve_b,
    )?;

    let mut msgs = vec![];
    let refund_a = max_a - deposit_a;
    let refund_b = max_b - deposit_b;
    if !refund_a.is_zero() {
        msgs.push(Asset::new(pool.token_a.clone(), refund_a).into_msg(info.sender.clone()));
    }
    if !refund_b.is_zero() {
        msgs.push(Asset::new(pool.token_b.clone(), refund_b).into_msg(info.sender.clone()));
    }

    Ok(Response::new()
        .add_messages(msgs)
        .add_attribute(attr::ACTION, "add_liquidity")
        .add_attribute(attr::POOL_ID, pool_id.to_string())
        .add_attribute(attr::OWNER, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::LIQUIDITY_ADDED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute(attr::AMOUNT_IN, shares_minted.to_string()),
        ))
}

fn execute_remove_liquidity(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    pool_id: u64,
    shares: Uint128,
    min_a: Uint128,
    min_b: Uint128,
    deadline: u64,
) -> Result<Response, ContractError> {
    assert_deadline(env, deadline)?;

    let mut pool = POOLS
        .may_load(deps.storage, pool_id)?
        .ok_or(ContractError::PoolNotFound { pool_id })?;

    let owned = LP_SHARES
        .may_load(deps.storage, (pool_id, &info.sender))?
        .unwrap_or_default();
    if shares.is_zero() || shares > owned {
        return Err(ContractError::InvalidAmount {});
    }

    let (amount_a, amount_b) =
        math::share_of_reserves(pool.reserve_a, pool.reserve_b, pool.total_shares, shares);
    if amount_a < min_a || amount_b < min_b {
        return Err(ContractError::Slippage {});
    }

    pool.reserve_a = pool.reserve_a.checked_sub(amount_a)?;
    pool.reserve_b = pool.reserve_b.checked_sub(amount_b)?;
    pool.total_shares = pool.total_shares.checked_sub(shares)?;
    POOLS.save(deps.storage, pool_id, &pool)?;

    let remaining = owned - shares;
    if remaining.is_zero() {
        LP_SHARES.remove(deps.storage, (pool_id, &info.sender));
    } else {
        LP_SHARES.save(deps.storage, (pool_id, &info.sender), &remaining)?;
    }

    defense::record_observation(
        deps.storage,
        pool_id,
        env.block.height,
        env.block.time.seconds(),
        pool.reserve_a,
        pool.reserve_b,
    )?;

    let mut msgs = vec![];
    if !amount_a.is_zero() {
        msgs.push(Asset::new(pool.token_a.clone(), amount_a).into_msg(info.sender.clone()));
    }
    if !amount_b.is_zero() {
        msgs.push(Asset::new(pool.token_b.clone(), amount_b).into_msg(info.sender.clone()));
    }

    Ok(Response::new()
        .add_messages(msgs)
        .add_attribute(attr::ACTION, "remove_liquidity")
        .add_attribute(attr::POOL_ID, pool_id.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::LIQUIDITY_REMOVED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute(attr::AMOUNT_OUT, format!("{amount_a},{amount_b}")),
        ))
}

/// Implements the eight-step swap ordering guarantee: validate and check the
/// breaker before touching the curve, settle funds in a fixed order, then
/// post-check that the constant product never shrank.
#[allow(clippy::too_many_arguments)]
fn execute_swap(
    deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    pool_id: u64,
    denom_in: String,
    amount_in: Uint128,
    min_out: Uint128,
    deadline: u64,
) -> Result<Response, ContractError> {
    // (1) validate inputs & deadline.
    assert_deadline(env, deadline)?;
    if amount_in.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }
    let denom_in = paw_common::asset::Denom::new(denom_in)?;

    let mut pool = POOLS
        .may_load(deps.storage, pool_id)?
        .ok_or(ContractError::PoolNotFound { pool_id })?;
    if !matches!(pool.status, PoolStatus::Active) {
        return Err(ContractError::CircuitBreakerTripped {});
    }

    let (reserve_in, reserve_out) = pool.reserves_for(&denom_in)?;
    let params = PARAMS.load(deps.storage)?;
    let now = env.block.time.seconds();
    let height = env.block.height;

    // (2) circuit breaker gate.
    defense::assert_breaker_allows_swap(deps.storage, pool_id, &params, now, amount_in, reserve_in)?;

    let same_block_swaps = defense::bump_same_block_swap_count(deps.storage, pool_id, height)?;
    let flash_event = defense::flash_loan_guard(
        deps.storage,
        &pool,
        &info.sender,
        amount_in,
        reserve_in,
        height,
        same_block_swaps,
        &params,
    )?;

    // (3) compute output, verify drain/slippage limits.
    let result = math::compute_swap(reserve_in, reserve_out, amount_in, pool.fee_bps)?;
    if result.amount_out < min_out {
        return Err(ContractError::Slippage {});
    }
    defense::assert_drain_limit(result.amount_out, reserve_out, &params)?;

    let denom_out = if denom_in == pool.token_a {
        pool.token_b.clone()
    } else {
        pool.token_a.clone()
    };

    // The fee portion leaves the pool to the fee collector below, so the
    // recorded reserve only grows by `amount_in − fee_amount` — crediting the
    // full `amount_in` would leave `reserve_in` overstating the contract's
    // actual balance by `fee_amount` after every swap (the teacher's
    // `contracts/pair` makes the same subtraction before writing reserves
    // back).
    let amount_in_after_fee = amount_in.checked_sub(result.fee_amount)?;
    let k_before = reserve_in.full_mul(reserve_out);
    let new_reserve_in = reserve_in + amount_in_after_fee;
    let new_reserve_out = reserve_out.checked_sub(result.amount_out)?;
    let k_after = new_reserve_in.full_mul(new_reserve_out);
    // (8) post-check: the constant product may never shrink.
    if k_after < k_before {
        return Err(ContractError::InsufficientLiquidity {});
    }

    // (4) transfer amountIn from user to module.
    Asset::new(denom_in.clone(), amount_in).assert_sent(info)?;

    // (7) update reserves and record the TWAP observation.
    if denom_in == pool.token_a {
        pool.reserve_a = new_reserve_in;
        pool.reserve_b = new_reserve_out;
    } else {
        pool.reserve_b = new_reserve_in;
        pool.reserve_a = new_reserve_out;
    }
    POOLS.save(deps.storage, pool_id, &pool)?;
    defense::record_observation(
        deps.storage,
        pool_id,
        height,
        now,
        pool.reserve_a,
        pool.reserve_b,
    )?;
    let breaker_event = defense::maybe_trip_breaker(deps.storage, pool_id, &params, now)?;

    // (5) fee to the fee collector, (6) amountOut to the user.
    let fee_collector = CONFIG.load(deps.storage)?.owner;
    let mut response = Response::new()
        .add_message(Asset::new(denom_out, result.amount_out).into_msg(info.sender.clone()));
    if !result.fee_amount.is_zero() {
        response =
            response.add_message(Asset::new(denom_in, result.fee_amount).into_msg(fee_collector));
    }

    response = response
        .add_attribute(attr::ACTION, "swap")
        .add_attribute(attr::POOL_ID, pool_id.to_string())
        .add_attribute(attr::AMOUNT_IN, amount_in.to_string())
        .add_attribute(attr::AMOUNT_OUT, result.amount_out.to_string())
        .add_attribute(attr::FEE_AMOUNT, result.fee_amount.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::SWAP_EXECUTED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute(attr::AMOUNT_OUT, result.amount_out.to_string()),
        );
    if let Some(event) = flash_event {
        response = response.add_event(event);
    }
    let breaker_just_tripped = breaker_event.is_some();
    if let Some(event) = breaker_event {
        response = response.add_event(event);
    }

    // Resting limit orders cross against the post-swap price, never against a
    // pool whose breaker just tripped on this very swap.
    if !breaker_just_tripped {
        let (fill_msgs, fill_events) = match_limit_orders(deps.storage, env, pool_id, &params)?;
        response = response.add_messages(fill_msgs);
        for event in fill_events {
            response = response.add_event(event);
        }
    }

    Ok(response)
}

#[allow(clippy::too_many_arguments)]
fn execute_place_limit_order(
    mut deps: DepsMut,
    env: &Env,
    info: &MessageInfo,
    pool_id: u64,
    side_in: String,
    amount_in: Uint128,
    price_limit: Decimal,
    expiry: u64,
) -> Result<Response, ContractError> {
    if amount_in.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }
    if expiry <= env.block.time.seconds() {
        return Err(ContractError::DeadlineExceeded {});
    }

    let pool = POOLS
        .may_load(deps.storage, pool_id)?
        .ok_or(ContractError::PoolNotFound { pool_id })?;

    let side = match &side_in {
        s if s.as_str() == pool.token_a.as_str() => LimitOrderSide::AIn,
        s if s.as_str() == pool.token_b.as_str() => LimitOrderSide::BIn,
        _ => {
            return Err(ContractError::InvalidDenom {
                reason: "side_in is not part of this pool".to_string(),
            })
        }
    };
    let in_denom = match side {
        LimitOrderSide::AIn => pool.token_a.clone(),
        LimitOrderSide::BIn => pool.token_b.clone(),
    };
    Asset::new(in_denom, amount_in).assert_sent(info)?;

    // `price_limit` is the minimum acceptable `amount_out / amount_in` ratio;
    // fixed at placement so matching only ever has to compare two `Uint128`s.
    let min_out = amount_in * price_limit;

    let order_id = next_order_id(&mut deps)?;
    let order = LimitOrder {
        id: order_id,
        pool_id,
        owner: info.sender.clone(),
        side_in: side,
        amount_in,
        min_out,
        price_limit,
        expiry,
        status: LimitOrderStatus::Open,
    };
    LIMIT_ORDERS.save(deps.storage, order_id, &order)?;
    ORDERS_BY_EXPIRY.save(deps.storage, (expiry, order_id), &())?;
    ORDERS_BY_POOL.save(deps.storage, (pool_id, order_id), &())?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "place_limit_order")
        .add_attribute(attr::POOL_ID, pool_id.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::LIMIT_ORDER_PLACED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute(attr::AMOUNT_IN, amount_in.to_string()),
        ))
}

fn execute_cancel_limit_order(
    deps: DepsMut,
    info: &MessageInfo,
    order_id: u64,
) -> Result<Response, ContractError> {
    let mut order = LIMIT_ORDERS
        .may_load(deps.storage, order_id)?
        .ok_or(ContractError::OrderNotFound { order_id })?;
    if order.owner != info.sender {
        return Err(ContractError::Unauthorized {});
    }
    if !matches!(order.status, LimitOrderStatus::Open) {
        return Err(ContractError::OrderNotFound { order_id });
    }

    let pool = POOLS.load(deps.storage, order.pool_id)?;
    let refund_denom = match order.side_in {
        LimitOrderSide::AIn => pool.token_a,
        LimitOrderSide::BIn => pool.token_b,
    };

    order.status = LimitOrderStatus::Cancelled;
    LIMIT_ORDERS.save(deps.storage, order_id, &order)?;
    ORDERS_BY_EXPIRY.remove(deps.storage, (order.expiry, order_id));
    ORDERS_BY_POOL.remove(deps.storage, (order.pool_id, order_id));

    Ok(Response::new()
        .add_message(Asset::new(refund_denom, order.amount_in).into_msg(info.sender.clone()))
        .add_attribute(attr::ACTION, "cancel_limit_order")
        .add_event(cosmwasm_std::Event::new(ty::LIMIT_ORDER_CANCELLED)))
}

/// Tries to cross up to `Params::limit_order_match_cap` resting orders on
/// `pool_id` against the pool's *current* reserves (i.e. as they stand right
/// after the triggering swap already applied its own reserve update). An
/// order only ever fills in full, using the same `compute_swap` curve as a
/// regular swap, because its `amount_in` already sits in the module account
/// from `execute_place_limit_order`'s `assert_sent` — never partially, since
/// spec.md's `LimitOrder` carries no partial-fill remainder field.
fn match_limit_orders(
    storage: &mut dyn cosmwasm_std::Storage,
    env: &Env,
    pool_id: u64,
    params: &Params,
) -> Result<(Vec<cosmwasm_std::CosmosMsg>, Vec<cosmwasm_std::Event>), ContractError> {
    let now = env.block.time.seconds();
    let candidates: Vec<u64> = ORDERS_BY_POOL
        .prefix(pool_id)
        .keys(storage, None, None, Order::Ascending)
        .filter_map(|item| item.ok())
        .take((params.limit_order_match_cap as usize).saturating_mul(4).max(1))
        .collect();

    let mut msgs = Vec::new();
    let mut events = Vec::new();
    let mut filled = 0u32;
    let fee_collector = CONFIG.load(storage)?.owner;

    for order_id in candidates {
        if filled >= params.limit_order_match_cap {
            break;
        }
        let mut order = match LIMIT_ORDERS.may_load(storage, order_id)? {
            Some(o) if matches!(o.status, LimitOrderStatus::Open) => o,
            _ => continue,
        };
        if order.expiry <= now {
            continue; // left for `SweepExpiredOrders`, not matched here.
        }

        let mut pool = POOLS.load(storage, pool_id)?;
        let (denom_in, denom_out, reserve_in, reserve_out) = match order.side_in {
            LimitOrderSide::AIn => (pool.token_a.clone(), pool.token_b.clone(), pool.reserve_a, pool.reserve_b),
            LimitOrderSide::BIn => (pool.token_b.clone(), pool.token_a.clone(), pool.reserve_b, pool.reserve_a),
        };

        let quote = match math::compute_swap(reserve_in, reserve_out, order.amount_in, pool.fee_bps) {
            Ok(q) => q,
            Err(_) => continue,
        };
        if quote.amount_out < order.min_out {
            continue; // not yet crossed; stays open for the next swap or sweep.
        }

        let amount_in_after_fee = match order.amount_in.checked_sub(quote.fee_amount) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let new_reserve_in = reserve_in + amount_in_after_fee;
        let new_reserve_out = match reserve_out.checked_sub(quote.amount_out) {
            Ok(v) => v,
            Err(_) => continue,
        };
        match order.side_in {
            LimitOrderSide::AIn => {
                pool.reserve_a = new_reserve_in;
                pool.reserve_b = new_reserve_out;
            }
            LimitOrderSide::BIn => {
                pool.reserve_b = new_reserve_in;
                pool.reserve_a = new_reserve_out;
            }
        }
        POOLS.save(storage, pool_id, &pool)?;
        defense::record_observation(storage, pool_id, env.block.height, now, pool.reserve_a, pool.reserve_b)?;

        msgs.push(Asset::new(denom_out, quote.amount_out).into_msg(order.owner.clone()));
        if !quote.fee_amount.is_zero() {
            msgs.push(Asset::new(denom_in, quote.fee_amount).into_msg(fee_collector.clone()));
        }

        order.status = LimitOrderStatus::Filled;
        LIMIT_ORDERS.save(storage, order_id, &order)?;
        ORDERS_BY_EXPIRY.remove(storage, (order.expiry, order_id));
        ORDERS_BY_POOL.remove(storage, (pool_id, order_id));

        events.push(
            cosmwasm_std::Event::new(ty::LIMIT_ORDER_FILLED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute("order_id", order_id.to_string())
                .add_attribute(attr::AMOUNT_OUT, quote.amount_out.to_string()),
        );
        filled += 1;
    }

    Ok((msgs, events))
}

/// Permissionless keeper sweep: expires resting orders past `expiry` that
/// never crossed, bounded by `Params::max_cleanup_per_block` (spec.md §4.4
/// "Timeout sweep" / §4.5 "Pagination cap", mirrored from `compute`'s
/// `execute_sweep_timeouts`).
fn execute_sweep_expired_orders(deps: DepsMut, env: &Env) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let now = env.block.time.seconds();
    let limit = params.max_cleanup_per_block as usize;

    let due: Vec<(u64, u64)> = ORDERS_BY_EXPIRY
        .range(deps.storage, None, None, Order::Ascending)
        .filter_map(|item| item.ok())
        .map(|(key, ())| key)
        .filter(|(expiry, _)| *expiry <= now)
        .take(limit)
        .collect();

    let mut expired = Vec::new();
    let mut msgs = Vec::new();
    for (expiry, order_id) in due {
        ORDERS_BY_EXPIRY.remove(deps.storage, (expiry, order_id));
        let mut order = match LIMIT_ORDERS.may_load(deps.storage, order_id)? {
            Some(o) => o,
            None => continue,
        };
        if !matches!(order.status, LimitOrderStatus::Open) {
            continue;
        }
        ORDERS_BY_POOL.remove(deps.storage, (order.pool_id, order_id));
        let pool = POOLS.load(deps.storage, order.pool_id)?;
        let refund_denom = match order.side_in {
            LimitOrderSide::AIn => pool.token_a,
            LimitOrderSide::BIn => pool.token_b,
        };
        msgs.push(Asset::new(refund_denom, order.amount_in).into_msg(order.owner.clone()));

        order.status = LimitOrderStatus::Expired;
        LIMIT_ORDERS.save(deps.storage, order_id, &order)?;
        expired.push(order_id);
    }

    let mut response = Response::new()
        .add_messages(msgs)
        .add_attribute(attr::ACTION, "sweep_expired_orders")
        .add_attribute("expired_count", expired.len().to_string());
    for order_id in expired {
        response = response.add_event(
            cosmwasm_std::Event::new(ty::LIMIT_ORDER_EXPIRED)
                .add_attribute("order_id", order_id.to_string()),
        );
    }
    Ok(response)
}

fn execute_update_params(
    deps: DepsMut,
    info: &MessageInfo,
    patch: ParamsMsg,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.owner {
        return Err(ContractError::Unauthorized {});
    }
    let mut params = PARAMS.load(deps.storage)?;
    params.apply_patch(&patch);
    PARAMS.save(deps.storage, &params)?;
    Ok(Response::new().add_attribute(attr::ACTION, "update_params"))
}

fn execute_force_resume_pool(
    deps: DepsMut,
    info: &MessageInfo,
    pool_id: u64,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.owner {
        return Err(ContractError::Unauthorized {});
    }
    defense::force_resume(deps.storage, pool_id)?;
    Ok(Response::new()
        .add_attribute(attr::ACTION, "force_resume_pool")
        .add_event(
            cosmwasm_std::Event::new(ty::CIRCUIT_BREAKER_RESUMED)
                .add_attribute(attr::POOL_ID, pool_id.to_string()),
        ))
}

fn assert_deadline(env: &Env, deadline: u64) -> Result<(), ContractError> {
    if env.block.time.seconds() > deadline {
        return Err(ContractError::DeadlineExceeded {});
    }
    Ok(())
}

fn to_std_err(e: ContractError) -> StdError {
    StdError::generic_err(e.to_string())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Pool { pool_id } => to_json_binary(&POOLS.load(deps.storage, pool_id)?),
        QueryMsg::Pools { start_after, limit } => {
            let limit = clamp_limit(limit);
            let start = start_after.map(Bound::exclusive);
            let pools = POOLS
                .range(deps.storage, start, None, Order::Ascending)
                .take(limit)
                .map(|item| item.map(|(_, pool)| pool))
                .collect::<StdResult<Vec<_>>>()?;
            to_json_binary(&PoolsResponse { pools })
        }
        QueryMsg::LpShares { pool_id, owner } => {
            let owner = deps.api.addr_validate(&owner)?;
            let shares = LP_SHARES
                .may_load(deps.storage, (pool_id, &owner))?
                .unwrap_or_default();
            to_json_binary(&shares)
        }
        QueryMsg::Breaker { pool_id } => {
            let state = CIRCUIT_BREAKERS
                .may_load(deps.storage, pool_id)?
                .unwrap_or_default();
            to_json_binary(&state)
        }
        QueryMsg::SimulateSwap {
            pool_id,
            denom_in,
            amount_in,
        } => {
            let pool = POOLS.load(deps.storage, pool_id)?;
            let denom_in = paw_common::asset::Denom::new(denom_in)?;
            let (reserve_in, reserve_out) = pool.reserves_for(&denom_in)?;
            let result = math::compute_swap(reserve_in, reserve_out, amount_in, pool.fee_bps)
                .map_err(to_std_err)?;
            to_json_binary(&SimulateSwapResponse {
                amount_out: result.amount_out,
                fee_amount: result.fee_amount,
            })
        }
        QueryMsg::LimitOrder { order_id } => {
            to_json_binary(&LIMIT_ORDERS.load(deps.storage, order_id)?)
        }
        QueryMsg::Params {} => to_json_binary(&PARAMS.load(deps.storage)?),
        QueryMsg::Twap { pool_id } => {
            let samples = defense::twap_samples(deps.storage, pool_id).map_err(to_std_err)?;
            to_json_binary(&TwapResponse {
                price_a_per_b: defense::twap_price(&samples),
                samples: samples.len() as u32,
            })
        }
    }
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(_deps: DepsMut, _env: Env, _msg: MigrateMsg) -> Result<Response, ContractError> {
    Ok(Response::new().add_attribute(attr::ACTION, "migrate"))
}
