use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Decimal, Uint128};
use cw_storage_plus::{Item, Map};

use paw_common::common::OwnershipProposal;

pub const TWAP_RING_NAME: (&str, &str) = ("oracle_twap_state", "oracle_twap_array");

/// Canonical asset string, e.g. `"BTC/USD"` (spec.md §3 "keyed by Asset
/// (canonical string)"). Kept as a plain validated `String` rather than a
/// newtype enum since the set of tradeable assets is governance-open, unlike
/// the DEX's fixed two-denom `Pool`.
pub fn validate_asset(asset: &str) -> Result<(), crate::error::ContractError> {
    if asset.is_empty() || asset.len() > 32 {
        return Err(crate::error::ContractError::InvalidPrice {});
    }
    Ok(())
}

#[cw_serde]
pub struct PriceFeed {
    pub last_aggregated: Decimal,
    pub last_height: u64,
    pub last_time: u64,
    pub sample_count: u32,
}

pub const PRICE_FEEDS: Map<&str, PriceFeed> = Map::new("oracle_price_feeds");

#[cw_serde]
pub struct ValidatorSubmission {
    pub price: Decimal,
    pub height: u64,
    pub time: u64,
    pub nonce: String,
}

/// Keyed by `(asset, validator_consensus_addr)` (spec.md §3).
pub const SUBMISSIONS: Map<(&str, &Addr), ValidatorSubmission> = Map::new("oracle_submissions");

/// Index of all validators who have ever submitted for an asset, so
/// end-of-block aggregation can enumerate candidates without a full table
/// scan (mirrors the reverse-index pattern spec.md §3 calls for elsewhere).
pub const SUBMITTERS_BY_ASSET: Map<(&str, &Addr), ()> = Map::new("oracle_submitters_by_asset");

#[cw_serde]
pub enum GeoRegion {
    NorthAmerica,
    Europe,
    Asia,
    SouthAmerica,
    Africa,
    Oceania,
}

#[cw_serde]
#[derive(Default)]
pub struct ValidatorStats {
    pub misses_in_window: u32,
    pub last_submitted_height: u64,
    pub geo_region: Option<GeoRegion>,
    pub stake: Uint128,
}

pub const VALIDATOR_STATS: Map<(&str, &Addr), ValidatorStats> = Map::new("oracle_validator_stats");

#[cw_serde]
pub enum BreakerReason {
    PriceMoveBetweenBlocks,
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

pub const CIRCUIT_BREAKERS: Map<&str, CircuitBreakerState> = Map::new("oracle_breakers");

pub const TWAP_RING_CAPACITY: u32 = 100;

#[cw_serde]
pub struct Observation {
    pub height: u64,
    pub time: u64,
    pub price: Decimal,
}

#[cw_serde]
pub struct Config {
    pub owner: Addr,
}

pub const CONFIG: Item<Config> = Item::new("oracle_config");
pub const OWNERSHIP_PROPOSAL: Item<OwnershipProposal> = Item::new("oracle_ownership_proposal");

/// Security floors enforced by `Params::apply_patch`; governance cannot set
/// below these (spec.md §4.7: "Constants identified as security-critical ...
/// are enforced as lower bounds").
pub mod floors {
    pub const MIN_VALIDATORS_FOR_SECURITY_FLOOR: u32 = 4;
    pub const MIN_OUTLIER_STD_DEVS_BPS_FLOOR: u64 = 10_000;
    pub const MAX_BREAKER_THRESHOLD_BPS_CEILING: u16 = 9_000;
}

#[cw_serde]
pub struct Params {
    pub min_validators_for_security: u32,
    /// `OutlierStdDevs`, expressed in basis points of one standard deviation
    /// (default 2.0 == 20_000 bps) so the field stays an integer type.
    pub outlier_std_devs_bps: u64,
    pub max_data_staleness_blocks: u64,
    pub max_stake_concentration_bps: u16,
    pub min_geographic_regions: u32,
    /// Mainnet-only gate, per spec.md §9 open question: enforced only when
    /// this is set (see `SPEC_FULL.md` §D.1 for the resolution).
    pub enforce_geo_diversity: bool,
    pub slashing_threshold_misses: u32,
    pub slash_fraction_min_bps: u16,
    pub slash_fraction_max_bps: u16,
    pub nonce_ttl_blocks: u64,
    pub max_cleanup_per_block: u32,
    pub breaker_threshold_bps: u16,
    pub cooldown_period_blocks: u64,
    pub twap_ring_capacity: u32,
    /// Conservative fallback volatility (spec.md §4.3 step 6) used when
    /// `ApproxSqrt` fails, expressed as basis points of the mean price.
    pub conservative_fallback_stddev_bps: u64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            min_validators_for_security: 7,
            outlier_std_devs_bps: 20_000,
            max_data_staleness_blocks: 10,
            max_stake_concentration_bps: 3_334,
            min_geographic_regions: 3,
            enforce_geo_diversity: false,
            slashing_threshold_misses: 5,
            slash_fraction_min_bps: 100,
            slash_fraction_max_bps: 1_000,
            nonce_ttl_blocks: 100,
            max_cleanup_per_block: 50,
            breaker_threshold_bps: 1_000,
            cooldown_period_blocks: 100,
            twap_ring_capacity: TWAP_RING_CAPACITY,
            conservative_fallback_stddev_bps: 750,
        }
    }
}

impl Params {
    /// Applies a governance patch, clamping security-critical fields to
    /// their floor/ceiling rather than rejecting the whole proposal.
    pub fn apply_patch(&mut self, patch: &crate::msg::ParamsMsg) {
        if let Some(v) = patch.min_validators_for_security {
            self.min_validators_for_security = v.max(floors::MIN_VALIDATORS_FOR_SECURITY_FLOOR);
        }
        if let Some(v) = patch.outlier_std_devs_bps {
            self.outlier_std_devs_bps = v.max(floors::MIN_OUTLIER_STD_DEVS_BPS_FLOOR);
        }
        if let Some(v) = patch.max_data_staleness_blocks {
            self.max_data_staleness_blocks = v;
        }
        if let Some(v) = patch.max_stake_concentration_bps {
            self.max_stake_concentration_bps = v;
        }
        if let Some(v) = patch.min_geographic_regions {
            self.min_geographic_regions = v;
        }
        if let Some(v) = patch.enforce_geo_diversity {
            self.enforce_geo_diversity = v;
        }
        if let Some(v) = patch.slashing_threshold_misses {
            self.slashing_threshold_misses = v;
        }
        if let Some(v) = patch.slash_fraction_min_bps {
            self.slash_fraction_min_bps = v;
        }
        if let Some(v) = patch.slash_fraction_max_bps {
            self.slash_fraction_max_bps = v;
        }
        if let Some(v) = patch.nonce_ttl_blocks {
            self.nonce_ttl_blocks = v;
        }
        if let Some(v) = patch.max_cleanup_per_block {
            self.max_cleanup_per_block = v;
        }
        if let Some(v) = patch.breaker_threshold_bps {
            self.breaker_threshold_bps = v.min(floors::MAX_BREAKER_THRESHOLD_BPS_CEILING);
        }
        if let Some(v) = patch.cooldown_period_blocks {
            self.cooldown_period_blocks = v;
        }
        if let Some(v) = patch.twap_ring_capacity {
            self.twap_ring_capacity = v;
        }
        if let Some(v) = patch.conservative_fallback_stddev_bps {
            self.conservative_fallback_stddev_bps = v;
        }
    }
}

pub const PARAMS: Item<Params> = Item::new("oracle_params");
