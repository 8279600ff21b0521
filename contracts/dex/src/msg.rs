use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Decimal, Uint128};

use crate::state::{CircuitBreakerState, LimitOrder, Params, Pool};

#[cw_serde]
pub struct InstantiateMsg {
    /// Address allowed to submit governance parameter proposals for this module.
    pub owner: String,
    pub params: Option<ParamsMsg>,
}

/// Governable knobs, all optional so a proposal can patch a subset.
/// Security-critical fields are clamped to their floor by `Params::apply_patch`.
#[cw_serde]
#[derive(Default)]
pub struct ParamsMsg {
    pub default_fee_bps: Option<u16>,
    pub breaker_threshold_1m_bps: Option<u16>,
    pub breaker_threshold_5m_bps: Option<u16>,
    pub breaker_threshold_15m_bps: Option<u16>,
    pub breaker_threshold_1h_bps: Option<u16>,
    pub cooldown_period_blocks: Option<u64>,
    pub resume_volume_factor_bps: Option<u16>,
    pub max_pool_drain_percent_bps: Option<u16>,
    pub flash_loan_threshold_bps: Option<u16>,
    pub flash_loan_protection_blocks: Option<u64>,
    pub twap_ring_capacity: Option<u32>,
    pub max_pools: Option<u64>,
    pub limit_order_match_cap: Option<u32>,
    pub max_cleanup_per_block: Option<u32>,
}

#[cw_serde]
pub enum ExecuteMsg {
    CreatePool {
        token_a: String,
        token_b: String,
        amount_a: Uint128,
        amount_b: Uint128,
        fee_bps: Option<u16>,
    },
    AddLiquidity {
        pool_id: u64,
        max_a: Uint128,
        max_b: Uint128,
        min_shares: Uint128,
        deadline: u64,
    },
    RemoveLiquidity {
        pool_id: u64,
        shares: Uint128,
        min_a: Uint128,
        min_b: Uint128,
        deadline: u64,
    },
    Swap {
        pool_id: u64,
        denom_in: String,
        amount_in: Uint128,
        min_out: Uint128,
        deadline: u64,
    },
    PlaceLimitOrder {
        pool_id: u64,
        side_in: String,
        amount_in: Uint128,
        price_limit: Decimal,
        expiry: u64,
    },
    CancelLimitOrder {
        order_id: u64,
    },
    /// Permissionless keeper call: clears resting limit orders past `expiry`,
    /// bounded by `Params::max_cleanup_per_block` (spec.md §4.5 "Pagination
    /// cap", mirroring compute's `SweepTimeouts`).
    SweepExpiredOrders {},
    /// Governance-only: patches a subset of `Params`, bound by security floors.
    UpdateParams {
        patch: ParamsMsg,
    },
    /// Governance-only: clears a tripped breaker ahead of `resume_at`.
    ForceResumePool {
        pool_id: u64,
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
    #[returns(Pool)]
    Pool { pool_id: u64 },
    #[returns(PoolsResponse)]
    Pools {
        start_after: Option<u64>,
        limit: Option<u32>,
    },
    #[returns(Uint128)]
    LpShares { pool_id: u64, owner: String },
    #[returns(CircuitBreakerState)]
    Breaker { pool_id: u64 },
    #[returns(SimulateSwapResponse)]
    SimulateSwap {
        pool_id: u64,
        denom_in: String,
        amount_in: Uint128,
    },
    #[returns(LimitOrder)]
    LimitOrder { order_id: u64 },
    #[returns(Params)]
    Params {},
    #[returns(TwapResponse)]
    Twap { pool_id: u64 },
}

#[cw_serde]
pub struct PoolsResponse {
    pub pools: Vec<Pool>,
}

#[cw_serde]
pub struct SimulateSwapResponse {
    pub amount_out: Uint128,
    pub fee_amount: Uint128,
}

#[cw_serde]
pub struct TwapResponse {
    pub price_a_per_b: Decimal,
    pub samples: u32,
}

#[cw_serde]
pub enum MigrateMsg {
    Migrate {},
}
