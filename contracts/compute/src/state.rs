use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, Uint128};
use cw_storage_plus::{Item, Map};

use paw_common::asset::Denom;
use paw_common::common::OwnershipProposal;
use paw_common::ratelimit::{TokenBucket, WindowCounter};

#[cw_serde]
pub enum ProviderStatus {
    Active,
    Jailed,
    Unbonding { withdraw_at: u64 },
}

/// `capabilities` is a bitset: bit `i` set means the provider advertises
/// capability `i` (spec.md §3 "capabilities: bitset"). The meaning of each
/// bit is opaque to this module, matched only by `required_capabilities &
/// provider.capabilities == required_capabilities` at request-assignment time.
#[cw_serde]
pub struct Provider {
    pub address: Addr,
    pub stake: Uint128,
    pub endpoint: String,
    /// Raw public key bytes used to verify `MsgSubmitResult` signatures
    /// (spec.md §4.4 "public key matches the registered provider's key,
    /// with length and point-on-curve validation").
    pub pubkey: Binary,
    pub reputation: i64,
    pub status: ProviderStatus,
    pub capabilities: u64,
    pub registered_height: u64,
}

pub const PROVIDERS: Map<&Addr, Provider> = Map::new("compute_providers");

#[cw_serde]
pub enum RequestStatus {
    Pending,
    Assigned,
    Completed,
    TimedOut,
    Disputed,
    Refunded,
}

#[cw_serde]
pub struct Request {
    pub id: u64,
    pub requester: Addr,
    pub provider: Option<Addr>,
    pub payload: Binary,
    pub max_price: Uint128,
    /// Escrowed amount still held by the module account for this request
    /// (spec.md §3 `EscrowEntry`); folded into `Request` rather than kept
    /// as a separate record, following the DEX's `LPPosition`-as-first-class-
    /// record convention rather than a second table for a 1:1 relationship.
    pub escrow: Uint128,
    pub escrow_released: bool,
    /// Root the submitted result's merkle proof must fold up to (spec.md
    /// §4.4 step (v)); pinned by the requester at `RequestCompute` time (see
    /// `SPEC_FULL.md` open-question log / `DESIGN.md` for why this field,
    /// absent from spec.md's literal data model, is required here).
    pub result_commitment: [u8; 32],
    pub required_capabilities: u64,
    pub deadline: u64,
    pub status: RequestStatus,
    pub submitted_height: u64,
    pub result_hash: Option<Binary>,
    pub result_height: Option<u64>,
}

pub const REQUESTS: Map<u64, Request> = Map::new("compute_requests");
pub const NEXT_REQUEST_ID: Item<u64> = Item::new("compute_next_request_id");

/// `{deadlineTime -> requestId}` reverse index (spec.md §3 "timeout reverse
/// index ... permits O(k) sweep at end-of-block").
pub const REQUESTS_BY_DEADLINE: Map<(u64, u64), ()> = Map::new("compute_requests_by_deadline");

#[cw_serde]
pub enum DisputeVote {
    ForProvider,
    AgainstProvider,
}

#[cw_serde]
pub enum DisputeStatus {
    Open,
    ResolvedForProvider,
    ResolvedAgainstProvider,
}

#[cw_serde]
pub struct Dispute {
    pub id: u64,
    pub request_id: u64,
    pub challenger: Addr,
    pub evidence: String,
    pub bonded_for: Uint128,
    pub bonded_against: Uint128,
    pub status: DisputeStatus,
    pub opened_height: u64,
    pub resolve_by: u64,
}

pub const DISPUTES: Map<u64, Dispute> = Map::new("compute_disputes");
pub const NEXT_DISPUTE_ID: Item<u64> = Item::new("compute_next_dispute_id");
/// `(dispute_id, validator)` -> the validator's stake-weighted vote, so a
/// validator cannot vote twice (checked on insert) and so disputes can be
/// re-tallied deterministically at resolution.
pub const DISPUTE_VOTES: Map<(u64, &Addr), DisputeVote> = Map::new("compute_dispute_votes");

pub const PROVIDER_RESULT_BUCKET: Map<&Addr, TokenBucket> = Map::new("compute_provider_bucket");
pub const PROVIDER_HOURLY_WINDOW: Map<&Addr, WindowCounter> = Map::new("compute_provider_hourly");
pub const PROVIDER_DAILY_WINDOW: Map<&Addr, WindowCounter> = Map::new("compute_provider_daily");

#[cw_serde]
pub struct Config {
    pub owner: Addr,
}

pub const CONFIG: Item<Config> = Item::new("compute_config");
pub const OWNERSHIP_PROPOSAL: Item<OwnershipProposal> = Item::new("compute_ownership_proposal");

/// Security floors enforced by `Params::apply_patch`; governance cannot set
/// below/above these (spec.md §4.7).
pub mod floors {
    use cosmwasm_std::Uint128;

    pub const MIN_PROVIDER_STAKE_FLOOR: Uint128 = Uint128::new(1_000_000);
    pub const MIN_UNBONDING_PERIOD_BLOCKS: u64 = 600;
    pub const MIN_CHALLENGE_WINDOW_BLOCKS: u64 = 10;
    pub const MAX_SLASH_FRACTION_BPS_CEILING: u16 = 5_000;
}

#[cw_serde]
pub struct Params {
    pub stake_denom: Denom,
    pub fee_denom: Denom,
    pub min_provider_stake: Uint128,
    pub unbonding_period_blocks: u64,
    pub challenge_window_blocks: u64,
    pub dispute_resolve_blocks: u64,
    pub nonce_ttl_blocks: u64,
    pub max_cleanup_per_block: u32,
    pub provider_bucket_capacity: Uint128,
    pub provider_bucket_refill_per_second: Uint128,
    pub provider_bucket_burst: Uint128,
    pub provider_hourly_cap: u64,
    pub provider_daily_cap: u64,
    pub slash_fraction_provider_bps: u16,
    pub slash_fraction_challenger_bps: u16,
    pub reputation_penalty_timeout: i64,
    pub reputation_penalty_dispute_loss: i64,
    pub reputation_jail_threshold: i64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            stake_denom: Denom::new("upaw").expect("valid default denom"),
            fee_denom: Denom::new("uusdt").expect("valid default denom"),
            min_provider_stake: floors::MIN_PROVIDER_STAKE_FLOOR,
            unbonding_period_blocks: 302_400,
            challenge_window_blocks: 600,
            dispute_resolve_blocks: 14_400,
            nonce_ttl_blocks: 100,
            max_cleanup_per_block: 50,
            provider_bucket_capacity: Uint128::new(60),
            provider_bucket_refill_per_second: Uint128::new(1),
            provider_bucket_burst: Uint128::new(10),
            provider_hourly_cap: 500,
            provider_daily_cap: 5_000,
            slash_fraction_provider_bps: 1_000,
            slash_fraction_challenger_bps: 1_000,
            reputation_penalty_timeout: 5,
            reputation_penalty_dispute_loss: 20,
            reputation_jail_threshold: -50,
        }
    }
}

impl Params {
    /// Applies a governance patch, clamping security-critical fields to
    /// their floor/ceiling rather than rejecting the whole proposal.
    pub fn apply_patch(&mut self, patch: &crate::msg::ParamsMsg) {
        if let Some(v) = patch.min_provider_stake {
            self.min_provider_stake = v.max(floors::MIN_PROVIDER_STAKE_FLOOR);
        }
        if let Some(v) = patch.unbonding_period_blocks {
            self.unbonding_period_blocks = v.max(floors::MIN_UNBONDING_PERIOD_BLOCKS);
        }
        if let Some(v) = patch.challenge_window_blocks {
            self.challenge_window_blocks = v.max(floors::MIN_CHALLENGE_WINDOW_BLOCKS);
        }
        if let Some(v) = patch.dispute_resolve_blocks {
            self.dispute_resolve_blocks = v;
        }
        if let Some(v) = patch.nonce_ttl_blocks {
            self.nonce_ttl_blocks = v;
        }
        if let Some(v) = patch.max_cleanup_per_block {
            self.max_cleanup_per_block = v;
        }
        if let Some(v) = patch.provider_bucket_capacity {
            self.provider_bucket_capacity = v;
        }
        if let Some(v) = patch.provider_bucket_refill_per_second {
            self.provider_bucket_refill_per_second = v;
        }
        if let Some(v) = patch.provider_bucket_burst {
            self.provider_bucket_burst = v;
        }
        if let Some(v) = patch.provider_hourly_cap {
            self.provider_hourly_cap = v;
        }
        if let Some(v) = patch.provider_daily_cap {
            self.provider_daily_cap = v;
        }
        if let Some(v) = patch.slash_fraction_provider_bps {
            self.slash_fraction_provider_bps = v.min(floors::MAX_SLASH_FRACTION_BPS_CEILING);
        }
        if let Some(v) = patch.slash_fraction_challenger_bps {
            self.slash_fraction_challenger_bps = v.min(floors::MAX_SLASH_FRACTION_BPS_CEILING);
        }
        if let Some(v) = patch.reputation_penalty_timeout {
            self.reputation_penalty_timeout = v;
        }
        if let Some(v) = patch.reputation_penalty_dispute_loss {
            self.reputation_penalty_dispute_loss = v;
        }
        if let Some(v) = patch.reputation_jail_threshold {
            self.reputation_jail_threshold = v;
        }
    }
}

pub const PARAMS: Item<Params> = Item::new("compute_params");
