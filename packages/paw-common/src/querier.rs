//! Thin wrappers over the bank and staking collaborator contracts (spec.md
//! §1). Bank reads use the standard CosmWasm host query; staking reads go
//! through the [`crate::keeper`] custom query since `power`/`status` are not
//! part of the standard bank/staking query set CosmWasm exposes.
pub use crate::keeper::{query_bonded_validators, query_validator};
use cosmwasm_std::{QuerierWrapper, StdResult, Uint128};

/// `BankKeeper.GetBalance` (spec.md §1).
pub fn query_balance(
    querier: &QuerierWrapper,
    account_addr: impl Into<String>,
    denom: impl Into<String>,
) -> StdResult<Uint128> {
    querier
        .query_balance(account_addr, denom)
        .map(|coin| coin.amount)
}

/// `BankKeeper.SpendableCoins` restricted to a single denom (spec.md §1);
/// CosmWasm does not distinguish locked vs spendable balances for a
/// contract's own account, so this is equivalent to `query_balance` here.
pub fn query_spendable(
    querier: &QuerierWrapper,
    account_addr: impl Into<String>,
    denom: impl Into<String>,
) -> StdResult<Uint128> {
    query_balance(querier, account_addr, denom)
}
