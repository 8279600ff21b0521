use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Decimal, StdError, StdResult, Uint128};
use cw_storage_plus::{Item, Map};

use paw_common::asset::Denom;
use paw_common::common::OwnershipProposal;

pub const TWAP_RING_NAME: (&str, &str) = ("dex_twap_state", "dex_twap_array");

#[cw_serde]
pub enum PoolStatus {
    Active,
    Paused,
}

#[cw_serde]
pub struct Pool {
    pub id: u64,
    pub token_a: Denom,
    pub token_b: Denom,
    pub reserve_a: Uint128,
    pub reserve_b: Uint128,
    pub total_shares: Uint128,
    pub fee_bps: u16,
    pub creator: Addr,
    pub created_height: u64,
    pub status: PoolStatus,
}

impl Pool {
    pub fn reserves_for(&self, denom_in: &Denom) -> StdResult<(Uint128, Uint128)> {
        if denom_in == &self.token_a {
            Ok((self.reserve_a, self.reserve_b))
        } else if denom_in == &self.token_b {
            Ok((self.reserve_b, self.reserve_a))
        } else {
            Err(StdError::generic_err("denom is not part of this pool"))
        }
    }
}

/// `(token_a, token_b)` already canonically ordered -> pool id, so a create request in
/// either order resolves to the same pool.
pub const POOL_BY_PAIR: Map<(String, String), u64> = Map::new("dex_pool_by_pair");
pub const POOLS: Map<u64, Pool> = Map::new("dex_pools");
pub const NEXT_POOL_ID: Item<u64> = Item::new("dex_next_pool_id");

pub const LP_SHARES: Map<(u64, &Addr), Uint128> = Map::new("dex_lp_shares");

#[cw_serde]
pub enum BreakerReason {
    PriceMove1m,
    PriceMove5m,
    PriceMove15m,
    PriceMove1h,
    Governance,
}

#[cw_serde]
#[derive(Default)]
pub struct CircuitBreakerState {
    pub tripped: bool,
    pub reason: Option<BreakerReason>,
    pub tripped_at: Option<u64>,
    pub tripped_price: Option<Decimal>,
    pub resume_at: Option<u64>,
    pub gradual_until: Option<u64>,
}

pub const CIRCUIT_BREAKERS: Map<u64, CircuitBreakerState> = Map::new("dex_breakers");

/// One ring sample per swap. `price_a_per_b` is `reserve_b / reserve_a` right after the swap,
/// used both for TWAP reads and for the breaker's windowed price-move checks.
#[cw_serde]
pub struct Observation {
    pub height: u64,
    pub time: u64,
    pub reserve_a: Uint128,
    pub reserve_b: Uint128,
    pub price_a_per_b: Decimal,
}

pub const TWAP_RING_CAPACITY: u32 = 100;

#[cw_serde]
pub enum LimitOrderSide {
    /// `amount_in` is denominated in `Pool::token_a`, order fills into `token_b`.
    AIn,
    BIn,
}

#[cw_serde]
pub enum LimitOrderStatus {
    Open,
    Filled,
    Cancelled,
    Expired,
}

#[cw_serde]
pub struct LimitOrder {
    pub id: u64,
    pub pool_id: u64,
    pub owner: Addr,
    pub side_in: LimitOrderSide,
    pub amount_in: Uint128,
    pub min_out: Uint128,
    pub price_limit: Decimal,
    pub expiry: u64,
    pub status: LimitOrderStatus,
}

pub const LIMIT_ORDERS: Map<u64, LimitOrder> = Map::new("dex_limit_orders");
pub const NEXT_ORDER_ID: Item<u64> = Item::new("dex_next_order_id");
pub const ORDERS_BY_EXPIRY: Map<(u64, u64), ()> = Map::new("dex_orders_by_expiry");
/// Reverse index used to scan a pool's resting orders for matching at swap time
/// and for removal on cancel/fill/expiry, without an unbounded `LIMIT_ORDERS` scan.
pub const ORDERS_BY_POOL: Map<(u64, u64), ()> = Map::new("dex_orders_by_pool");

/// Height at which `(pool_id, addr)` last moved a large amount of value, for the
/// flash-loan lockout in `defense::flash_loan_guard`.
pub const LAST_LARGE_INTERACTION: Map<(u64, &Addr), u64> = Map::new("dex_last_large_interaction");
/// Swaps observed against a pool within the current block, for the same-block multi-swap flag.
pub const SWAPS_THIS_BLOCK: Map<(u64, u64), u32> = Map::new("dex_swaps_this_block");

#[cw_serde]
pub struct Config {
    pub owner: Addr,
}

pub const CONFIG: Item<Config> = Item::new("dex_config");
pub const OWNERSHIP_PROPOSAL: Item<OwnershipProposal> = Item::new("dex_ownership_proposal");

/// Security floors enforced by `Params::apply_patch`; governance cannot set below these.
pub mod floors {
    pub const MIN_COOLDOWN_PERIOD_BLOCKS: u64 = 20;
    pub const MIN_BREAKER_THRESHOLD_BPS: u16 = 200;
    pub const MAX_POOL_DRAIN_PERCENT_BPS_CEILING: u16 = 5_000;
}

#[cw_serde]
pub struct Params {
    pub default_fee_bps: u16,
    pub breaker_threshold_1m_bps: u16,
    pub breaker_threshold_5m_bps: u16,
    pub breaker_threshold_15m_bps: u16,
    pub breaker_threshold_1h_bps: u16,
    pub cooldown_period_blocks: u64,
    pub resume_volume_factor_bps: u16,
    pub max_pool_drain_percent_bps: u16,
    pub flash_loan_threshold_bps: u16,
    pub flash_loan_protection_blocks: u64,
    pub twap_ring_capacity: u32,
    pub max_pools: u64,
    /// Bound on how many resting limit orders a single swap will attempt to
    /// cross, and how many expired orders `SweepExpiredOrders` clears per call
    /// (spec.md §4.5 "Pagination cap" applied to the limit-order book).
    pub limit_order_match_cap: u32,
    pub max_cleanup_per_block: u32,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            default_fee_bps: 30,
            breaker_threshold_1m_bps: 1_000,
            breaker_threshold_5m_bps: 2_000,
            breaker_threshold_15m_bps: 2_500,
            breaker_threshold_1h_bps: 3_000,
            cooldown_period_blocks: 100,
            resume_volume_factor_bps: 5_000,
            max_pool_drain_percent_bps: 3_000,
            flash_loan_threshold_bps: 1_000,
            flash_loan_protection_blocks: 10,
            twap_ring_capacity: TWAP_RING_CAPACITY,
            max_pools: 10_000,
            limit_order_match_cap: 5,
            max_cleanup_per_block: 50,
        }
    }
}

impl Params {
    /// Applies a governance patch, clamping security-critical fields to their floor
    /// rather than rejecting the whole proposal outright.
    pub fn apply_patch(&mut self, patch: &crate::msg::ParamsMsg) {
        if let Some(v) = patch.default_fee_bps {
            self.default_fee_bps = v;
        }
        if let Some(v) = patch.breaker_threshold_1m_bps {
            self.breaker_threshold_1m_bps = v.max(floors::MIN_BREAKER_THRESHOLD_BPS);
        }
        if let Some(v) = patch.breaker_threshold_5m_bps {
            self.breaker_threshold_5m_bps = v.max(floors::MIN_BREAKER_THRESHOLD_BPS);
        }
        if let Some(v) = patch.breaker_threshold_15m_bps {
            self.breaker_threshold_15m_bps = v.max(floors::MIN_BREAKER_THRESHOLD_BPS);
        }
        if let Some(v) = patch.breaker_threshold_1h_bps {
            self.breaker_threshold_1h_bps = v.max(floors::MIN_BREAKER_THRESHOLD_BPS);
        }
        if let Some(v) = patch.cooldown_period_blocks {
            self.cooldown_period_blocks = v.max(floors::MIN_COOLDOWN_PERIOD_BLOCKS);
        }
        if let Some(v) = patch.resume_volume_factor_bps {
            self.resume_volume_factor_bps = v;
        }
        if let Some(v) = patch.max_pool_drain_percent_bps {
            self.max_pool_drain_percent_bps = v.min(floors::MAX_POOL_DRAIN_PERCENT_BPS_CEILING);
        }
        if let Some(v) = patch.flash_loan_threshold_bps {
            self.flash_loan_threshold_bps = v;
        }
        if let Some(v) = patch.flash_loan_protection_blocks {
            self.flash_loan_protection_blocks = v;
        }
        if let Some(v) = patch.twap_ring_capacity {
            self.twap_ring_capacity = v;
        }
        if let Some(v) = patch.max_pools {
            self.max_pools = v;
        }
        if let Some(v) = patch.limit_order_match_cap {
            self.limit_order_match_cap = v;
        }
        if let Some(v) = patch.max_cleanup_per_block {
            self.max_cleanup_per_block = v;
        }
    }
}

pub const PARAMS: Item<Params> = Item::new("dex_params");
