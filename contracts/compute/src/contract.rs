#[cfg(not(feature = "library"))]
use cosmwasm_std::entry_point;
use cosmwasm_std::{
    to_json_binary, Binary, Deps, DepsMut, Env, MessageInfo, Order, Response, StdResult, Uint128,
};
use cw2::set_contract_version;
use cw_utils::must_pay;

use paw_common::asset::Asset;
use paw_common::common::{claim_ownership, drop_ownership_proposal, propose_new_owner};
use paw_common::event::{attr, ty};
use paw_common::guard::ReentrancyGuard;
use paw_common::keeper::{query_validator, PawMsg, PawQuery, ValidatorStatus};
use paw_common::pagination::clamp_limit;

use crate::defense;
use crate::error::ContractError;
use crate::msg::{
    ExecuteMsg, InstantiateMsg, MigrateMsg, ParamsMsg, ProvidersResponse, QueryMsg,
    RequestsResponse,
};
use crate::state::{
    Config, Dispute, DisputeStatus, DisputeVote, Params, Provider, ProviderStatus, Request,
    RequestStatus, CONFIG, DISPUTES, DISPUTE_VOTES, NEXT_DISPUTE_ID, NEXT_REQUEST_ID,
    OWNERSHIP_PROPOSAL, PARAMS, PROVIDERS, REQUESTS, REQUESTS_BY_DEADLINE,
};

const CONTRACT_NAME: &str = "paw-compute";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry lock for every state-mutating handler (spec.md §4.2, shared with
/// the DEX and Oracle; see `paw_common::guard`).
const REENTRANCY_GUARD: ReentrancyGuard = ReentrancyGuard::new("compute_reentrancy_lock");

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
    NEXT_REQUEST_ID.save(deps.storage, &1)?;
    NEXT_DISPUTE_ID.save(deps.storage, &1)?;

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
        ExecuteMsg::RegisterProvider {
            endpoint,
            pubkey,
            capabilities,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res =
                execute_register_provider(deps.branch(), &env, &info, endpoint, pubkey, capabilities)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::BeginUnbondProvider {} => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_begin_unbond_provider(deps.branch(), &env, &info)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::WithdrawProviderStake {} => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_withdraw_provider_stake(deps.branch(), &env, &info)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::RequestCompute {
            payload,
            max_price,
            deadline,
            required_capabilities,
            result_commitment,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_request_compute(
                deps.branch(),
                &env,
                &info,
                payload,
                max_price,
                deadline,
                required_capabilities,
                result_commitment,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::SubmitResult {
            request_id,
            result_hash,
            signature,
            merkle_proof,
            nonce,
            timestamp,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_submit_result(
                deps.branch(),
                &env,
                &info,
                request_id,
                result_hash,
                signature,
                merkle_proof,
                nonce,
                timestamp,
            )?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::CancelRequest { request_id } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_cancel_request(deps.branch(), &info, request_id)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::OpenDispute {
            request_id,
            evidence,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_open_dispute(deps.branch(), &env, &info, request_id, evidence)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::VoteDispute {
            dispute_id,
            for_provider,
        } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_vote_dispute(deps.branch(), &info, dispute_id, for_provider)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::ResolveDispute { dispute_id } => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_resolve_dispute(deps.branch(), &env, dispute_id)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::SweepTimeouts {} => {
            REENTRANCY_GUARD.enter(deps.storage, ContractError::Reentrancy {})?;
            let res = execute_sweep_timeouts(deps.branch(), &env)?;
            REENTRANCY_GUARD.exit(deps.storage)?;
            Ok(res)
        }
        ExecuteMsg::UpdateParams { patch } => execute_update_params(deps, &info, patch),
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

fn execute_register_provider(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
    endpoint: String,
    pubkey: Binary,
    capabilities: u64,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let sent = must_pay(info, params.stake_denom.as_str())
        .map_err(|_| ContractError::InsufficientStake {})?;
    if sent < params.min_provider_stake {
        return Err(ContractError::InsufficientStake {});
    }

    if PROVIDERS.has(deps.storage, &info.sender) {
        return Err(ContractError::Unauthorized {});
    }

    let provider = Provider {
        address: info.sender.clone(),
        stake: sent,
        endpoint,
        pubkey,
        reputation: 0,
        status: ProviderStatus::Active,
        capabilities,
        registered_height: env.block.height,
    };
    PROVIDERS.save(deps.storage, &info.sender, &provider)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "register_provider")
        .add_attribute(attr::PROVIDER, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::PROVIDER_REGISTERED)
                .add_attribute(attr::PROVIDER, info.sender.to_string()),
        ))
}

fn execute_begin_unbond_provider(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let mut provider = PROVIDERS
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| ContractError::ProviderNotFound {
            provider: info.sender.to_string(),
        })?;

    if matches!(provider.status, ProviderStatus::Unbonding { .. }) {
        return Err(ContractError::StillUnbonding {});
    }

    let withdraw_at = env.block.height + params.unbonding_period_blocks;
    provider.status = ProviderStatus::Unbonding { withdraw_at };
    PROVIDERS.save(deps.storage, &info.sender, &provider)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "begin_unbond_provider")
        .add_attribute(attr::PROVIDER, info.sender.to_string()))
}

fn execute_withdraw_provider_stake(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let provider = PROVIDERS
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| ContractError::ProviderNotFound {
            provider: info.sender.to_string(),
        })?;

    let withdraw_at = match provider.status {
        ProviderStatus::Unbonding { withdraw_at } => withdraw_at,
        _ => return Err(ContractError::StillUnbonding {}),
    };
    if env.block.height < withdraw_at {
        return Err(ContractError::StillUnbonding {});
    }

    PROVIDERS.remove(deps.storage, &info.sender);
    let refund = Asset::new(params.stake_denom, provider.stake);

    Ok(Response::new()
        .add_message(refund.into_msg(info.sender.clone()))
        .add_attribute(attr::ACTION, "withdraw_provider_stake")
        .add_attribute(attr::PROVIDER, info.sender.to_string()))
}

/// Core of `RequestCompute` (spec.md §4.4), shared with the inbound IBC
/// packet handler: escrow is assumed already validated/held by the caller
/// (either `must_pay` against the sender's attached funds, or an ICS-20
/// transfer that already landed in this contract's account), mirroring the
/// DEX's `apply_remote_swap` split between fund custody and state transition.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_request_compute(
    deps: DepsMut<PawQuery>,
    env: &Env,
    requester: &cosmwasm_std::Addr,
    payload: Binary,
    escrow: Uint128,
    deadline: u64,
    required_capabilities: u64,
    result_commitment: Binary,
) -> Result<(u64, cosmwasm_std::Addr), ContractError> {
    if deadline <= env.block.time.seconds() {
        return Err(ContractError::DeadlineExceeded {});
    }
    if escrow.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }
    let commitment: [u8; 32] = result_commitment
        .as_slice()
        .try_into()
        .map_err(|_| ContractError::InvalidMerkleProof {})?;

    let provider = defense::match_provider(deps.storage, required_capabilities)?;

    let id = NEXT_REQUEST_ID.load(deps.storage)?;
    NEXT_REQUEST_ID.save(deps.storage, &(id + 1))?;

    let request = Request {
        id,
        requester: requester.clone(),
        provider: Some(provider.clone()),
        payload,
        max_price: escrow,
        escrow,
        escrow_released: false,
        result_commitment: commitment,
        required_capabilities,
        deadline,
        status: RequestStatus::Assigned,
        submitted_height: env.block.height,
        result_hash: None,
        result_height: None,
    };
    REQUESTS.save(deps.storage, id, &request)?;
    REQUESTS_BY_DEADLINE.save(deps.storage, (deadline, id), &())?;

    Ok((id, provider))
}

#[allow(clippy::too_many_arguments)]
fn execute_request_compute(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
    payload: Binary,
    max_price: Uint128,
    deadline: u64,
    required_capabilities: u64,
    result_commitment: Binary,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let sent = must_pay(info, params.fee_denom.as_str())
        .map_err(|_| ContractError::InvalidAmount {})?;
    if sent != max_price || sent.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }

    let (id, provider) = apply_request_compute(
        deps,
        env,
        &info.sender,
        payload,
        sent,
        deadline,
        required_capabilities,
        result_commitment,
    )?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "request_compute")
        .add_attribute(attr::REQUEST_ID, id.to_string())
        .add_attribute(attr::REQUESTER, info.sender.to_string())
        .add_attribute(attr::PROVIDER, provider.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::REQUEST_CREATED)
                .add_attribute(attr::REQUEST_ID, id.to_string())
                .add_attribute(attr::PROVIDER, provider.to_string())
                .add_attribute(attr::ESCROW_AMOUNT, sent.to_string()),
        ))
}

#[allow(clippy::too_many_arguments)]
fn execute_submit_result(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
    request_id: u64,
    result_hash: Binary,
    signature: Binary,
    merkle_proof: Vec<Binary>,
    nonce: String,
    timestamp: u64,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let mut request =
        REQUESTS
            .may_load(deps.storage, request_id)?
            .ok_or(ContractError::RequestNotFound { request_id })?;

    if !matches!(request.status, RequestStatus::Assigned) {
        return Err(ContractError::AlreadyFinalized {});
    }
    if request.provider.as_ref() != Some(&info.sender) {
        return Err(ContractError::UnauthorizedProvider {});
    }

    let now = env.block.time.seconds();
    if now > request.deadline {
        return Err(ContractError::DeadlineExceeded {});
    }

    let mut provider = PROVIDERS
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| ContractError::ProviderNotFound {
            provider: info.sender.to_string(),
        })?;
    if !matches!(provider.status, ProviderStatus::Active) {
        return Err(ContractError::ProviderNotActive {});
    }

    defense::assert_result_rate_allowed(deps.storage, &info.sender, &params, now)?;

    defense::verify_result_submission(
        deps.api,
        &provider,
        request_id,
        &result_hash,
        &signature,
        &merkle_proof,
        &nonce,
        timestamp,
        now,
        &request.result_commitment,
    )?;

    defense::assert_nonce_fresh(deps.storage, &info.sender, &nonce, env.block.height)?;

    REQUESTS_BY_DEADLINE.remove(deps.storage, (request.deadline, request.id));
    request.status = RequestStatus::Completed;
    request.result_hash = Some(result_hash);
    request.result_height = Some(env.block.height);
    request.escrow_released = true;
    REQUESTS.save(deps.storage, request_id, &request)?;

    provider.reputation = provider.reputation.saturating_add(1);
    PROVIDERS.save(deps.storage, &info.sender, &provider)?;

    let payout = Asset::new(params.fee_denom, request.escrow);

    Ok(Response::new()
        .add_message(payout.into_msg(info.sender.clone()))
        .add_attribute(attr::ACTION, "submit_result")
        .add_attribute(attr::REQUEST_ID, request_id.to_string())
        .add_attribute(attr::PROVIDER, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::REQUEST_COMPLETED)
                .add_attribute(attr::REQUEST_ID, request_id.to_string())
                .add_attribute(attr::PROVIDER, info.sender.to_string()),
        ))
}

fn execute_cancel_request(
    deps: DepsMut<PawQuery>,
    info: &MessageInfo,
    request_id: u64,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let mut request =
        REQUESTS
            .may_load(deps.storage, request_id)?
            .ok_or(ContractError::RequestNotFound { request_id })?;

    if request.requester != info.sender {
        return Err(ContractError::Unauthorized {});
    }
    if !matches!(request.status, RequestStatus::Pending) {
        return Err(ContractError::AlreadyFinalized {});
    }

    REQUESTS_BY_DEADLINE.remove(deps.storage, (request.deadline, request.id));
    request.status = RequestStatus::Refunded;
    request.escrow_released = true;
    let refund_amount = request.escrow;
    REQUESTS.save(deps.storage, request_id, &request)?;

    let refund = Asset::new(params.fee_denom, refund_amount);

    Ok(Response::new()
        .add_message(refund.into_msg(info.sender.clone()))
        .add_attribute(attr::ACTION, "cancel_request")
        .add_attribute(attr::REQUEST_ID, request_id.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::REQUEST_CANCELLED)
                .add_attribute(attr::REQUEST_ID, request_id.to_string()),
        ))
}

fn execute_open_dispute(
    deps: DepsMut<PawQuery>,
    env: &Env,
    info: &MessageInfo,
    request_id: u64,
    evidence: String,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let mut request =
        REQUESTS
            .may_load(deps.storage, request_id)?
            .ok_or(ContractError::RequestNotFound { request_id })?;

    if !matches!(request.status, RequestStatus::Completed) {
        return Err(ContractError::AlreadyFinalized {});
    }
    let result_height = request.result_height.unwrap_or(request.submitted_height);
    if env.block.height > result_height + params.challenge_window_blocks {
        return Err(ContractError::DisputeWindowClosed {});
    }

    let validator = query_validator(&deps.querier, info.sender.as_str())?
        .ok_or(ContractError::NotValidator {})?;
    if !matches!(validator.status, ValidatorStatus::Bonded) {
        return Err(ContractError::NotValidator {});
    }

    let dispute_id = NEXT_DISPUTE_ID.load(deps.storage)?;
    NEXT_DISPUTE_ID.save(deps.storage, &(dispute_id + 1))?;

    let stake = Uint128::from(validator.power);
    let dispute = Dispute {
        id: dispute_id,
        request_id,
        challenger: info.sender.clone(),
        evidence,
        bonded_for: Uint128::zero(),
        bonded_against: stake,
        status: DisputeStatus::Open,
        opened_height: env.block.height,
        resolve_by: env.block.height + params.dispute_resolve_blocks,
    };
    DISPUTES.save(deps.storage, dispute_id, &dispute)?;
    DISPUTE_VOTES.save(
        deps.storage,
        (dispute_id, &info.sender),
        &DisputeVote::AgainstProvider,
    )?;

    request.status = RequestStatus::Disputed;
    REQUESTS.save(deps.storage, request_id, &request)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "open_dispute")
        .add_attribute(attr::DISPUTE_ID, dispute_id.to_string())
        .add_attribute(attr::REQUEST_ID, request_id.to_string())
        .add_attribute(attr::CHALLENGER, info.sender.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::DISPUTE_OPENED)
                .add_attribute(attr::DISPUTE_ID, dispute_id.to_string())
                .add_attribute(attr::REQUEST_ID, request_id.to_string()),
        ))
}

fn execute_vote_dispute(
    deps: DepsMut<PawQuery>,
    info: &MessageInfo,
    dispute_id: u64,
    for_provider: bool,
) -> Result<Response<PawMsg>, ContractError> {
    let mut dispute =
        DISPUTES
            .may_load(deps.storage, dispute_id)?
            .ok_or(ContractError::DisputeNotFound { dispute_id })?;
    if !matches!(dispute.status, DisputeStatus::Open) {
        return Err(ContractError::DisputeNotOpen {});
    }
    if DISPUTE_VOTES.has(deps.storage, (dispute_id, &info.sender)) {
        return Err(ContractError::AlreadyVoted {});
    }

    let validator = query_validator(&deps.querier, info.sender.as_str())?
        .ok_or(ContractError::NotValidator {})?;
    if !matches!(validator.status, ValidatorStatus::Bonded) {
        return Err(ContractError::NotValidator {});
    }
    let stake = Uint128::from(validator.power);

    let vote = if for_provider {
        dispute.bonded_for += stake;
        DisputeVote::ForProvider
    } else {
        dispute.bonded_against += stake;
        DisputeVote::AgainstProvider
    };
    DISPUTE_VOTES.save(deps.storage, (dispute_id, &info.sender), &vote)?;
    DISPUTES.save(deps.storage, dispute_id, &dispute)?;

    Ok(Response::new()
        .add_attribute(attr::ACTION, "vote_dispute")
        .add_attribute(attr::DISPUTE_ID, dispute_id.to_string()))
}

/// Tallies a resolved dispute once `resolve_by` has passed, exposed as an
/// ordinary message for the same reason the oracle exposes `AggregatePrice`
/// explicitly: no implicit end-of-block hook exists at the CosmWasm contract
/// boundary (spec.md §4.4 "ResolveDispute").
fn execute_resolve_dispute(
    deps: DepsMut<PawQuery>,
    env: &Env,
    dispute_id: u64,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let mut dispute =
        DISPUTES
            .may_load(deps.storage, dispute_id)?
            .ok_or(ContractError::DisputeNotFound { dispute_id })?;
    if !matches!(dispute.status, DisputeStatus::Open) {
        return Err(ContractError::DisputeNotOpen {});
    }
    if env.block.height < dispute.resolve_by {
        return Err(ContractError::DisputeWindowClosed {});
    }

    let mut request = REQUESTS.load(deps.storage, dispute.request_id)?;
    let provider_wins = dispute.bonded_for >= dispute.bonded_against;

    let mut msgs = Vec::new();
    let mut provider_opt = request
        .provider
        .as_ref()
        .and_then(|addr| PROVIDERS.may_load(deps.storage, addr).ok().flatten());

    if provider_wins {
        dispute.status = DisputeStatus::ResolvedForProvider;
        if let Some(addr) = &request.provider {
            msgs.push(paw_common::keeper::slash_msg(
                dispute.challenger.as_str(),
                defense::slash_fraction_bps(params.slash_fraction_challenger_bps),
            ));
            if let Some(provider) = provider_opt.as_mut() {
                provider.reputation = provider.reputation.saturating_add(5);
                PROVIDERS.save(deps.storage, addr, provider)?;
            }
        }
    } else {
        dispute.status = DisputeStatus::ResolvedAgainstProvider;
        if let Some(addr) = &request.provider {
            msgs.push(paw_common::keeper::slash_msg(
                addr.as_str(),
                defense::slash_fraction_bps(params.slash_fraction_provider_bps),
            ));
            if let Some(provider) = provider_opt.as_mut() {
                defense::apply_reputation_penalty(
                    provider,
                    params.reputation_penalty_dispute_loss,
                    &params,
                );
                PROVIDERS.save(deps.storage, addr, provider)?;
                if matches!(provider.status, ProviderStatus::Jailed) {
                    msgs.push(paw_common::keeper::jail_msg(addr.as_str()));
                }
            }
        }
        request.escrow_released = true;
        let refund = Asset::new(params.fee_denom, request.escrow);
        msgs.push(refund.into_msg(request.requester.clone()));
    }

    DISPUTES.save(deps.storage, dispute_id, &dispute)?;
    REQUESTS.save(deps.storage, dispute.request_id, &request)?;

    Ok(Response::new()
        .add_messages(msgs)
        .add_attribute(attr::ACTION, "resolve_dispute")
        .add_attribute(attr::DISPUTE_ID, dispute_id.to_string())
        .add_event(
            cosmwasm_std::Event::new(ty::DISPUTE_RESOLVED)
                .add_attribute(attr::DISPUTE_ID, dispute_id.to_string())
                .add_attribute("provider_wins", provider_wins.to_string()),
        ))
}

/// End-of-block sweep driver: expires `ASSIGNED` requests past their
/// deadline via the reverse deadline index and evicts stale result nonces,
/// both bounded by `Params::max_cleanup_per_block` (spec.md §4.4 "Timeout
/// sweep", §4.5 "Nonce TTL").
fn execute_sweep_timeouts(
    deps: DepsMut<PawQuery>,
    env: &Env,
) -> Result<Response<PawMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let now = env.block.time.seconds();
    let limit = params.max_cleanup_per_block as usize;

    let due: Vec<(u64, u64)> = REQUESTS_BY_DEADLINE
        .range(deps.storage, None, None, Order::Ascending)
        .filter_map(|item| item.ok())
        .map(|(key, ())| key)
        .filter(|(deadline, _)| *deadline <= now)
        .take(limit)
        .collect();

    let mut timed_out = Vec::new();
    let mut msgs = Vec::new();
    for (deadline, request_id) in due {
        REQUESTS_BY_DEADLINE.remove(deps.storage, (deadline, request_id));
        let mut request = match REQUESTS.may_load(deps.storage, request_id)? {
            Some(r) => r,
            None => continue,
        };
        if !matches!(request.status, RequestStatus::Pending | RequestStatus::Assigned) {
            continue;
        }
        request.status = RequestStatus::TimedOut;
        request.escrow_released = true;
        let refund = Asset::new(params.fee_denom.clone(), request.escrow);
        msgs.push(refund.into_msg(request.requester.clone()));

        if let Some(addr) = &request.provider {
            if let Some(mut provider) = PROVIDERS.may_load(deps.storage, addr)? {
                defense::apply_reputation_penalty(
                    &mut provider,
                    params.reputation_penalty_timeout,
                    &params,
                );
                PROVIDERS.save(deps.storage, addr, &provider)?;
            }
        }

        REQUESTS.save(deps.storage, request_id, &request)?;
        timed_out.push(request_id);
    }

    let swept_nonces =
        defense::sweep_expired_nonces(deps.storage, env.block.height, params.nonce_ttl_blocks, limit)?;

    let mut response = Response::new()
        .add_messages(msgs)
        .add_attribute(attr::ACTION, "sweep_timeouts")
        .add_attribute("timed_out_count", timed_out.len().to_string())
        .add_attribute("swept_nonces", swept_nonces.to_string());
    for request_id in timed_out {
        response = response.add_event(
            cosmwasm_std::Event::new(ty::REQUEST_TIMED_OUT)
                .add_attribute(attr::REQUEST_ID, request_id.to_string()),
        );
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

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps<PawQuery>, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Provider { address } => {
            let addr = deps.api.addr_validate(&address)?;
            to_json_binary(&PROVIDERS.load(deps.storage, &addr)?)
        }
        QueryMsg::Providers { start_after, limit } => {
            let limit = clamp_limit(limit);
            let start = start_after
                .map(|s| deps.api.addr_validate(&s))
                .transpose()?;
            let start_bound = start.as_ref().map(cw_storage_plus::Bound::exclusive);
            let providers: Vec<Provider> = PROVIDERS
                .range(deps.storage, start_bound, None, Order::Ascending)
                .take(limit)
                .map(|item| item.map(|(_, v)| v))
                .collect::<StdResult<Vec<_>>>()?;
            to_json_binary(&ProvidersResponse { providers })
        }
        QueryMsg::Request { request_id } => {
            to_json_binary(&REQUESTS.load(deps.storage, request_id)?)
        }
        QueryMsg::Requests { start_after, limit } => {
            let limit = clamp_limit(limit);
            let start_bound = start_after.map(cw_storage_plus::Bound::exclusive);
            let requests: Vec<Request> = REQUESTS
                .range(deps.storage, start_bound, None, Order::Ascending)
                .take(limit)
                .map(|item| item.map(|(_, v)| v))
                .collect::<StdResult<Vec<_>>>()?;
            to_json_binary(&RequestsResponse { requests })
        }
        QueryMsg::Dispute { dispute_id } => {
            to_json_binary(&DISPUTES.load(deps.storage, dispute_id)?)
        }
        QueryMsg::Params {} => to_json_binary(&PARAMS.load(deps.storage)?),
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
