use cosmwasm_schema::cw_serde;
use cosmwasm_std::{
    attr, Addr, CustomMsg, CustomQuery, DepsMut, Env, MessageInfo, Response, StdError, StdResult,
};
use cw_storage_plus::Item;

const MAX_PROPOSAL_TTL: u64 = 1_209_600;

/// Pending change of a module's governance owner (spec.md §4.7: "governance
/// proposals mutate [params] via typed setters").
#[cw_serde]
pub struct OwnershipProposal {
    pub owner: Addr,
    pub ttl: u64,
}

/// Opens a request to change the module's governance owner. Only the current
/// owner may call this. Generic over the caller's custom query (`Q`, default
/// `Empty`) and message (`M`, default `Empty`) types, so modules that route
/// `CosmosMsg::Custom` to the staking collaborator (oracle, compute) can
/// share this helper with the DEX, which needs neither.
pub fn propose_new_owner<Q: CustomQuery, M: CustomMsg>(
    deps: DepsMut<Q>,
    info: MessageInfo,
    env: Env,
    new_owner: String,
    expires_in: u64,
    owner: Addr,
    proposal: Item<OwnershipProposal>,
) -> StdResult<Response<M>> {
    if info.sender != owner {
        return Err(StdError::generic_err("Unauthorized"));
    }

    let new_owner = deps.api.addr_validate(new_owner.as_str())?;

    if new_owner == owner {
        return Err(StdError::generic_err("New owner cannot be the same"));
    }

    if expires_in > MAX_PROPOSAL_TTL {
        return Err(StdError::generic_err(format!(
            "expires_in cannot be higher than {MAX_PROPOSAL_TTL}"
        )));
    }

    proposal.save(
        deps.storage,
        &OwnershipProposal {
            owner: new_owner.clone(),
            ttl: env.block.time.seconds() + expires_in,
        },
    )?;

    Ok(Response::new().add_attributes(vec![
        attr("action", "propose_new_owner"),
        attr("new_owner", new_owner),
    ]))
}

/// Withdraws a pending ownership-change proposal.
pub fn drop_ownership_proposal<Q: CustomQuery, M: CustomMsg>(
    deps: DepsMut<Q>,
    info: MessageInfo,
    owner: Addr,
    proposal: Item<OwnershipProposal>,
) -> StdResult<Response<M>> {
    if info.sender != owner {
        return Err(StdError::generic_err("Unauthorized"));
    }

    proposal.remove(deps.storage);

    Ok(Response::new().add_attribute("action", "drop_ownership_proposal"))
}

/// Finalizes an ownership-change proposal. Only the newly proposed owner may
/// call this, and only before the proposal's TTL elapses.
pub fn claim_ownership<Q: CustomQuery, M: CustomMsg>(
    deps: DepsMut<Q>,
    info: MessageInfo,
    env: Env,
    proposal: Item<OwnershipProposal>,
    cb: fn(DepsMut<Q>, Addr) -> StdResult<()>,
) -> StdResult<Response<M>> {
    let p = proposal
        .load(deps.storage)
        .map_err(|_| StdError::generic_err("Ownership proposal not found"))?;

    if info.sender != p.owner {
        return Err(StdError::generic_err("Unauthorized"));
    }

    if env.block.time.seconds() > p.ttl {
        return Err(StdError::generic_err("Ownership proposal expired"));
    }

    proposal.remove(deps.storage);

    cb(deps, p.owner.clone())?;

    Ok(Response::new().add_attributes(vec![
        attr("action", "claim_ownership"),
        attr("new_owner", p.owner),
    ]))
}

/// Marker trait for a module's governance-mutable `Params` record. Fields the
/// spec calls out as security-critical (reentrancy guard toggles, minimum
/// breaker thresholds, minimum validator counts) implement a lower bound in
/// their typed setter rather than here, since the bound differs per field;
/// this trait only documents the convention (spec.md §4.7).
pub trait SecurityBounded {
    /// Returns `Ok(())` if every security-critical field is still within its
    /// hard-coded lower bound, otherwise a descriptive error.
    fn check_security_bounds(&self) -> StdResult<()>;
}
