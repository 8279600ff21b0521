use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::Decimal;

use crate::state::{CircuitBreakerState, Params, PriceFeed, ValidatorSubmission};

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
    pub min_validators_for_security: Option<u32>,
    pub outlier_std_devs_bps: Option<u64>,
    pub max_data_staleness_blocks: Option<u64>,
    pub max_stake_concentration_bps: Option<u16>,
    pub min_geographic_regions: Option<u32>,
    pub enforce_geo_diversity: Option<bool>,
    pub slashing_threshold_misses: Option<u32>,
    pub slash_fraction_min_bps: Option<u16>,
    pub slash_fraction_max_bps: Option<u16>,
    pub nonce_ttl_blocks: Option<u64>,
    pub max_cleanup_per_block: Option<u32>,
    pub breaker_threshold_bps: Option<u16>,
    pub cooldown_period_blocks: Option<u64>,
    pub twap_ring_capacity: Option<u32>,
    pub conservative_fallback_stddev_bps: Option<u64>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Restricted to bonded validators (spec.md §4.3). `geo_region` is
    /// accepted on a validator's first submission for an asset in the
    /// current aggregation window and ignored afterward (see `SPEC_FULL.md`
    /// §D.1).
    SubmitPrice {
        asset: String,
        price: Decimal,
        nonce: String,
        geo_region: Option<String>,
    },
    /// Governance-only: patches a subset of `Params`, bound by security floors.
    UpdateParams {
        patch: ParamsMsg,
    },
    /// Governance-only: clears a tripped asset breaker ahead of `resume_at`.
    ForceResumeAsset {
        asset: String,
    },
    /// End-of-block aggregation, invoked once per asset by the consensus
    /// layer's end-of-block driver (spec.md §4.3 "Aggregation: Runs in
    /// end-of-block per asset"). Exposed as an ordinary message because
    /// CosmWasm contracts have no implicit end-of-block hook; the driver is
    /// expected to call this for every asset with pending submissions.
    AggregatePrice {
        asset: String,
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
    #[returns(Decimal)]
    Price { asset: String },
    #[returns(PriceFeed)]
    Feed { asset: String },
    #[returns(ValidatorSubmission)]
    Submission { asset: String, validator: String },
    #[returns(CircuitBreakerState)]
    Breaker { asset: String },
    #[returns(Params)]
    Params {},
    #[returns(TwapResponse)]
    Twap { asset: String },
}

#[cw_serde]
pub struct TwapResponse {
    pub price: Decimal,
    pub samples: u32,
}

#[cw_serde]
pub enum MigrateMsg {
    Migrate {},
}
