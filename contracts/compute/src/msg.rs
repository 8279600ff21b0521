use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Binary, Uint128};

use crate::state::{Dispute, Params, Provider, Request};

#[cw_serde]
pub struct InstantiateMsg {
    /// Address allowed to submit governance parameter proposals for this module.
    pub owner: String,
    pub params: Option<ParamsMsg>,
}

/// Governable knobs, all optional so a proposal can patch a subset.
/// Security-critical fields are clamped to their floor/ceiling by
/// `Params::apply_patch`.
#[cw_serde]
#[derive(Default)]
pub struct ParamsMsg {
    pub min_provider_stake: Option<Uint128>,
    pub unbonding_period_blocks: Option<u64>,
    pub challenge_window_blocks: Option<u64>,
    pub dispute_resolve_blocks: Option<u64>,
    pub nonce_ttl_blocks: Option<u64>,
    pub max_cleanup_per_block: Option<u32>,
    pub provider_bucket_capacity: Option<Uint128>,
    pub provider_bucket_refill_per_second: Option<Uint128>,
    pub provider_bucket_burst: Option<Uint128>,
    pub provider_hourly_cap: Option<u64>,
    pub provider_daily_cap: Option<u64>,
    pub slash_fraction_provider_bps: Option<u16>,
    pub slash_fraction_challenger_bps: Option<u16>,
    pub reputation_penalty_timeout: Option<i64>,
    pub reputation_penalty_dispute_loss: Option<i64>,
    pub reputation_jail_threshold: Option<i64>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Escrows `stake` (attached as funds in `Params::stake_denom`) into the
    /// module account (spec.md §4.4 "RegisterProvider ... requires stake ≥
    /// MinProviderStake escrowed from the provider's balance").
    RegisterProvider {
        endpoint: String,
        pubkey: Binary,
        capabilities: u64,
    },
    /// `ACTIVE|JAILED → UNBONDING` (spec.md §4.4 provider lifecycle).
    BeginUnbondProvider {},
    /// `UNBONDING → retired` once the unbonding period has elapsed; refunds
    /// remaining stake.
    WithdrawProviderStake {},
    /// Escrows `max_price` (funds in `Params::fee_denom`) and assigns a
    /// matching provider (spec.md §4.4 "RequestCompute").
    RequestCompute {
        payload: Binary,
        max_price: Uint128,
        deadline: u64,
        required_capabilities: u64,
        result_commitment: Binary,
    },
    /// spec.md §4.4 "SubmitResult", verification steps (i)-(vi).
    SubmitResult {
        request_id: u64,
        result_hash: Binary,
        signature: Binary,
        merkle_proof: Vec<Binary>,
        nonce: String,
        timestamp: u64,
    },
    /// Only from `PENDING`; refunds full escrow.
    CancelRequest {
        request_id: u64,
    },
    /// Only by registered (bonded) validators within the challenge window
    /// after result submission (spec.md §4.4 "OpenDispute").
    OpenDispute {
        request_id: u64,
        evidence: String,
    },
    /// Stake-weighted validator vote on an open dispute.
    VoteDispute {
        dispute_id: u64,
        for_provider: bool,
    },
    /// Finalizes a dispute once `resolve_by` has passed, exposed as an
    /// ordinary message for the same reason the oracle exposes
    /// `AggregatePrice` explicitly (spec.md §4.4; no implicit end-of-block
    /// hook exists at the CosmWasm contract boundary).
    ResolveDispute {
        dispute_id: u64,
    },
    /// End-of-block sweep driver: expires timed-out requests via the
    /// reverse deadline index and evicts stale result nonces, bounded by
    /// `max_cleanup_per_block` (spec.md §4.4 "Timeout sweep", §4.5 "Nonce
    /// TTL").
    SweepTimeouts {},
    /// Governance-only: patches a subset of `Params`, bound by security floors.
    UpdateParams {
        patch: ParamsMsg,
    },
    ProposeNewOwner {
        owner: String,
        expires_in: u64,
    },
    DropOwnershipProposal {},
    ClaimOwnership {},
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    #[returns(Provider)]
    Provider { address: String },
    #[returns(ProvidersResponse)]
    Providers {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    #[returns(Request)]
    Request { request_id: u64 },
    #[returns(RequestsResponse)]
    Requests {
        start_after: Option<u64>,
        limit: Option<u32>,
    },
    #[returns(Dispute)]
    Dispute { dispute_id: u64 },
    #[returns(Params)]
    Params {},
}

#[cw_serde]
pub struct ProvidersResponse {
    pub providers: Vec<Provider>,
}

#[cw_serde]
pub struct RequestsResponse {
    pub requests: Vec<Request>,
}

#[cw_serde]
pub enum MigrateMsg {
    Migrate {},
}
