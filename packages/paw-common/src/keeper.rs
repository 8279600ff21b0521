//! Collaborator boundary for the staking module (spec.md §1: "Staking /
//! slashing modules — expose `GetValidator`, `IterateBondedValidators`,
//! `Slash`, `Jail`"). `Slash`/`Jail` are privileged native-module mutations
//! that a plain CosmWasm host query cannot express, so — following the
//! pattern already scaffolded in the teacher's `packages/bindings` crate for
//! chain-specific extensions — they are represented as a custom Cosmos
//! message/query pair rather than a Rust trait object. This is the only
//! place in PAW that reaches outside the module's own store (spec.md §9:
//! "dynamic dispatch ... used exclusively at module boundaries").
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{CosmosMsg, CustomMsg, CustomQuery, Decimal, QuerierWrapper, StdResult};

/// Validator bonded status, as seen by the staking collaborator.
#[cw_serde]
pub enum ValidatorStatus {
    Bonded,
    Unbonding,
    Unbonded,
    Jailed,
}

/// Response to `PawQuery::Validator`, mirroring `GetValidator(address) →
/// {power, status}` (spec.md §1).
#[cw_serde]
pub struct ValidatorInfo {
    pub consensus_addr: String,
    pub power: u64,
    pub status: ValidatorStatus,
}

/// Custom query surface routed to the staking collaborator by the consensus
/// layer.
#[cw_serde]
pub enum PawQuery {
    Validator { consensus_addr: String },
    BondedValidators {},
}

impl CustomQuery for PawQuery {}

/// Custom message surface for mutations only the staking collaborator may
/// perform.
#[cw_serde]
pub enum PawMsg {
    /// `StakingKeeper.Slash(validator, fraction)` (spec.md §4.3 "Slashing").
    SlashValidator {
        consensus_addr: String,
        fraction: Decimal,
    },
    /// `StakingKeeper.Jail(validator)`, used by the Compute module to remove
    /// a provably faulty provider's underlying validator from the active set
    /// when a provider is also a bonded validator.
    JailValidator { consensus_addr: String },
}

impl CustomMsg for PawMsg {}

pub fn slash_msg(consensus_addr: impl Into<String>, fraction: Decimal) -> CosmosMsg<PawMsg> {
    CosmosMsg::Custom(PawMsg::SlashValidator {
        consensus_addr: consensus_addr.into(),
        fraction,
    })
}

pub fn jail_msg(consensus_addr: impl Into<String>) -> CosmosMsg<PawMsg> {
    CosmosMsg::Custom(PawMsg::JailValidator {
        consensus_addr: consensus_addr.into(),
    })
}

/// `StakingKeeper.GetValidator` (spec.md §1).
pub fn query_validator(
    querier: &QuerierWrapper<PawQuery>,
    consensus_addr: impl Into<String>,
) -> StdResult<Option<ValidatorInfo>> {
    querier.query(&cosmwasm_std::QueryRequest::Custom(PawQuery::Validator {
        consensus_addr: consensus_addr.into(),
    }))
}

/// `StakingKeeper.IterateBondedValidators` (spec.md §1), used by the Oracle
/// defense layer's stake-concentration and geographic-diversity checks.
pub fn query_bonded_validators(
    querier: &QuerierWrapper<PawQuery>,
) -> StdResult<Vec<ValidatorInfo>> {
    querier.query(&cosmwasm_std::QueryRequest::Custom(
        PawQuery::BondedValidators {},
    ))
}
