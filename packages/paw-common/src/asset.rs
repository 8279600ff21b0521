use std::fmt;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{
    BankMsg, Coin, CosmosMsg, MessageInfo, QuerierWrapper, StdError, StdResult, Uint128,
};
use cw_utils::must_pay;

/// Minimum initial LP share amount, permanently locked on a pool's first deposit
/// so the first depositor cannot manipulate the initial share price (spec.md
/// §4.1 "mints `sqrt(depositA·depositB) − MINIMUM_LIQUIDITY` shares").
pub const MINIMUM_LIQUIDITY: Uint128 = Uint128::new(1_000);

/// A bank-module coin denomination, validated as a bech32 native denom or an
/// ICS-20 `ibc/<hash>` denom (spec.md §4.2 "Ante checks"). PAW trades native
/// coins only — no CW20/contract-issued assets — so unlike the teacher's
/// `AssetInfo` enum there is a single, native-only representation.
#[cw_serde]
#[derive(Eq, PartialOrd, Ord, Hash)]
pub struct Denom(String);

impl Denom {
    pub fn new(denom: impl Into<String>) -> StdResult<Self> {
        let denom = denom.into();
        validate_denom(&denom)?;
        Ok(Denom(denom))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ibc(&self) -> bool {
        self.0.to_ascii_lowercase().starts_with("ibc/")
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Denom {
    type Error = StdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Denom::new(value)
    }
}

/// Mirrors the native-denom validity rules the bank module enforces: 3-128
/// ASCII characters, lowercase alphanumerics plus `/`, `:`, `.`, `_`, `-`.
pub fn validate_denom(denom: &str) -> StdResult<()> {
    if denom.len() < 3 || denom.len() > 128 {
        return Err(StdError::generic_err(format!(
            "invalid denom length: {denom}"
        )));
    }
    let valid = denom
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if !valid {
        return Err(StdError::generic_err(format!(
            "invalid denom characters: {denom}"
        )));
    }
    Ok(())
}

/// Returns the two denoms in their canonical pool ordering (spec.md §3:
/// "Invariant: `tokenA < tokenB` lexicographically").
pub fn canonical_order(a: Denom, b: Denom) -> (Denom, Denom) {
    if a.as_str() < b.as_str() {
        (a, b)
    } else {
        (b, a)
    }
}

/// A native-coin amount, the unit the DEX and Compute modules move around
/// internally before handing off to the bank collaborator.
#[cw_serde]
pub struct Asset {
    pub denom: Denom,
    pub amount: Uint128,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl Asset {
    pub fn new(denom: Denom, amount: Uint128) -> Self {
        Asset { denom, amount }
    }

    /// Builds the `BankMsg::Send` that moves this asset out of the module
    /// account to `recipient`. Module accounts in PAW are the contract's own
    /// address, exactly as CosmWasm contracts already act as escrow holders.
    pub fn into_msg(self, recipient: impl Into<String>) -> CosmosMsg {
        CosmosMsg::Bank(BankMsg::Send {
            to_address: recipient.into(),
            amount: vec![Coin {
                denom: self.denom.into_string(),
                amount: self.amount,
            }],
        })
    }

    /// Validates that the funds attached to `info` match this asset exactly.
    /// Only correct when `self` is the *only* denom expected in `info.funds`
    /// (`must_pay` rejects a funds vector carrying more than one coin) — use
    /// [`assert_funds_exactly`] whenever a handler expects two or more
    /// denoms in the same message, the DEX/Compute equivalent of the ante
    /// "amountIn > 0" and denom checks (spec.md §4.2).
    pub fn assert_sent(&self, info: &MessageInfo) -> StdResult<()> {
        let sent = must_pay(info, self.denom.as_str())
            .map_err(|err| StdError::generic_err(err.to_string()))?;
        if sent != self.amount {
            return Err(StdError::generic_err(
                "sent funds do not match declared asset amount",
            ));
        }
        Ok(())
    }
}

/// Validates that `info.funds` carries exactly the denoms/amounts in
/// `expected` and nothing else, for handlers (`CreatePool`, `AddLiquidity`)
/// that expect two native denoms in a single message — `must_pay`/
/// `assert_sent` can't be called twice against the same `info.funds` since
/// it rejects a funds vector with more than one coin. Mirrors the teacher's
/// `CoinsExt::assert_coins_properly_sent` (`packages/astroport/src/asset.rs`),
/// narrowed to this crate's native-only `Asset`.
pub fn assert_funds_exactly(info: &MessageInfo, expected: &[Asset]) -> StdResult<()> {
    use std::collections::HashMap;

    let expected_by_denom: HashMap<&str, Uint128> = expected
        .iter()
        .map(|asset| (asset.denom.as_str(), asset.amount))
        .collect();

    for coin in &info.funds {
        match expected_by_denom.get(coin.denom.as_str()) {
            Some(amount) if *amount == coin.amount => {}
            Some(_) => {
                return Err(StdError::generic_err(
                    "sent funds do not match declared asset amount",
                ))
            }
            None => {
                return Err(StdError::generic_err(format!(
                    "unexpected denom in sent funds: {}",
                    coin.denom
                )))
            }
        }
    }

    let sent_denoms: std::collections::HashSet<&str> =
        info.funds.iter().map(|c| c.denom.as_str()).collect();
    for asset in expected {
        if !asset.amount.is_zero() && !sent_denoms.contains(asset.denom.as_str()) {
            return Err(StdError::generic_err(format!(
                "missing expected denom in sent funds: {}",
                asset.denom
            )));
        }
    }

    Ok(())
}

/// Returns a module account's balance of `denom`, equivalent to the bank
/// collaborator's `GetBalance` contract (spec.md §1).
pub fn query_balance(
    querier: &QuerierWrapper,
    account: impl Into<String>,
    denom: &Denom,
) -> StdResult<Uint128> {
    querier
        .query_balance(account, denom.as_str())
        .map(|coin| coin.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_denom() {
        assert!(Denom::new("ab").is_err());
    }

    #[test]
    fn accepts_ibc_denom() {
        let d = Denom::new("ibc/ABCDEF0123").unwrap();
        assert!(d.is_ibc());
    }

    #[test]
    fn assert_funds_exactly_accepts_two_denoms_in_one_message() {
        let info = cosmwasm_std::testing::mock_info(
            "depositor",
            &[
                Coin::new(1_000_000, "upaw"),
                Coin::new(2_000_000, "uusdt"),
            ],
        );
        let upaw = Denom::new("upaw").unwrap();
        let uusdt = Denom::new("uusdt").unwrap();
        assert!(assert_funds_exactly(
            &info,
            &[
                Asset::new(upaw, Uint128::new(1_000_000)),
                Asset::new(uusdt, Uint128::new(2_000_000)),
            ]
        )
        .is_ok());
    }

    #[test]
    fn assert_funds_exactly_rejects_mismatched_amount() {
        let info = cosmwasm_std::testing::mock_info("depositor", &[Coin::new(999, "upaw")]);
        let upaw = Denom::new("upaw").unwrap();
        let uusdt = Denom::new("uusdt").unwrap();
        assert!(assert_funds_exactly(
            &info,
            &[
                Asset::new(upaw, Uint128::new(1_000_000)),
                Asset::new(uusdt, Uint128::new(2_000_000)),
            ]
        )
        .is_err());
    }

    #[test]
    fn canonical_order_is_lexicographic() {
        let a = Denom::new("uusdt").unwrap();
        let b = Denom::new("upaw").unwrap();
        let (lo, hi) = canonical_order(a.clone(), b.clone());
        assert_eq!(lo, b);
        assert_eq!(hi, a);
    }
}
