use cosmwasm_std::{Uint128, Uint256};

use paw_common::math::isqrt_u256;

use crate::error::ContractError;

pub const BPS_DENOMINATOR: u128 = 10_000;

/// Result of a constant-product swap quote (spec.md §4.1).
pub struct SwapResult {
    pub amount_out: Uint128,
    pub fee_amount: Uint128,
}

/// `amountInAfterFee = amountIn · (1 − feeRate)`; `amountOut = reserveOut ·
/// amountInAfterFee / (reserveIn + amountInAfterFee)`. Widened into `Uint256`
/// throughout, mirroring the teacher's `compute_swap` (which widens into
/// `Uint256`/`Decimal256` for the same reason: `reserveOut · amountInAfterFee`
/// can exceed `Uint128::MAX` well before any individual reserve does).
pub fn compute_swap(
    reserve_in: Uint128,
    reserve_out: Uint128,
    amount_in: Uint128,
    fee_bps: u16,
) -> Result<SwapResult, ContractError> {
    if amount_in.is_zero() {
        return Err(ContractError::InvalidAmount {});
    }

    let fee_amount = amount_in.multiply_ratio(fee_bps as u128, BPS_DENOMINATOR);
    let amount_in_after_fee = amount_in.checked_sub(fee_amount)?;

    let reserve_in_256 = Uint256::from(reserve_in);
    let reserve_out_256 = Uint256::from(reserve_out);
    let amount_in_after_fee_256 = Uint256::from(amount_in_after_fee);

    let numerator = reserve_out_256.checked_mul(amount_in_after_fee_256)?;
    let denominator = reserve_in_256.checked_add(amount_in_after_fee_256)?;
    if denominator.is_zero() {
        return Err(ContractError::InsufficientLiquidity {});
    }
    let amount_out_256 = numerator.checked_div(denominator)?;
    let amount_out = Uint128::try_from(amount_out_256)
        .map_err(|_| ContractError::InsufficientLiquidity {})?;

    if amount_out >= reserve_out {
        return Err(ContractError::InsufficientLiquidity {});
    }

    Ok(SwapResult {
        amount_out,
        fee_amount,
    })
}

/// Inverse of [`compute_swap`]: the `amountIn` required to receive exactly
/// `amount_out`, used by `SimulateSwap`/limit-order matching. Mirrors the
/// teacher's `compute_offer_amount`.
pub fn compute_offer_amount(
    reserve_in: Uint128,
    reserve_out: Uint128,
    amount_out: Uint128,
    fee_bps: u16,
) -> Result<Uint128, ContractError> {
    if amount_out >= reserve_out {
        return Err(ContractError::InsufficientLiquidity {});
    }

    let reserve_in_256 = Uint256::from(reserve_in);
    let reserve_out_256 = Uint256::from(reserve_out);
    let amount_out_256 = Uint256::from(amount_out);

    // amountInAfterFee = reserveIn * amountOut / (reserveOut - amountOut)
    let numerator = reserve_in_256.checked_mul(amount_out_256)?;
    let denominator = reserve_out_256.checked_sub(amount_out_256)?;
    let amount_in_after_fee_256 = numerator.checked_div(denominator)?;

    // amountIn = ceil(amountInAfterFee * BPS_DENOMINATOR / (BPS_DENOMINATOR - feeBps)),
    // rounded up so the quoted offer never under-funds the fee that's about to be taken.
    let fee_complement_256 = Uint256::from(BPS_DENOMINATOR - fee_bps as u128);
    let scaled = amount_in_after_fee_256.checked_mul(Uint256::from(BPS_DENOMINATOR))?;
    let amount_in_256 = scaled
        .checked_add(fee_complement_256 - Uint256::one())?
        .checked_div(fee_complement_256)?;

    Uint128::try_from(amount_in_256).map_err(|_| ContractError::InsufficientLiquidity {})
}

/// Initial LP share mint for a pool's first deposit: `sqrt(depositA·depositB)
/// − MINIMUM_LIQUIDITY`, widened into `Uint256` before the product (see
/// `paw_common::math::isqrt_u256`).
pub fn initial_shares(deposit_a: Uint128, deposit_b: Uint128) -> Uint128 {
    let product = Uint256::from(deposit_a) * Uint256::from(deposit_b);
    isqrt_u256(product)
}

/// Balanced deposit for a subsequent `AddLiquidity`: the largest `(a, b)` with
/// `a ≤ max_a`, `b ≤ max_b` and `a / reserve_a == b / reserve_b`, plus the
/// shares it mints (`totalShares · a / reserveA`).
pub fn balanced_deposit(
    reserve_a: Uint128,
    reserve_b: Uint128,
    total_shares: Uint128,
    max_a: Uint128,
    max_b: Uint128,
) -> Result<(Uint128, Uint128, Uint128), ContractError> {
    if reserve_a.is_zero() || reserve_b.is_zero() {
        return Err(ContractError::InsufficientLiquidity {});
    }

    // b implied by spending all of max_a at the current price.
    let b_for_max_a = max_a.multiply_ratio(reserve_b, reserve_a);
    let (deposit_a, deposit_b) = if b_for_max_a <= max_b {
        (max_a, b_for_max_a)
    } else {
        let a_for_max_b = max_b.multiply_ratio(reserve_a, reserve_b);
        (a_for_max_b, max_b)
    };

    let shares = total_shares.multiply_ratio(deposit_a, reserve_a);
    Ok((deposit_a, deposit_b, shares))
}

/// Pro-rata reserves returned for `shares` out of `total_shares`.
pub fn share_of_reserves(
    reserve_a: Uint128,
    reserve_b: Uint128,
    total_shares: Uint128,
    shares: Uint128,
) -> (Uint128, Uint128) {
    if total_shares.is_zero() {
        return (Uint128::zero(), Uint128::zero());
    }
    (
        reserve_a.multiply_ratio(shares, total_shares),
        reserve_b.multiply_ratio(shares, total_shares),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_matches_seed_scenario_s2() {
        // S2: pool (1_000_000 UPAW, 2_000_000 UUSDT), fee 0.3%, swap in 100_000 UPAW.
        let result = compute_swap(
            Uint128::new(1_000_000),
            Uint128::new(2_000_000),
            Uint128::new(100_000),
            30,
        )
        .unwrap();
        assert_eq!(result.fee_amount, Uint128::new(300));
        assert_eq!(result.amount_out, Uint128::new(181_322));
    }

    #[test]
    fn initial_shares_matches_seed_scenario_s1() {
        // S1: pool (1_000_000 UPAW, 2_000_000 UUSDT) => k = 2e12.
        let shares = initial_shares(Uint128::new(1_000_000), Uint128::new(2_000_000));
        assert_eq!(shares, Uint128::new(1_414_213));
    }

    #[test]
    fn balanced_deposit_picks_the_binding_side() {
        let (a, b, shares) = balanced_deposit(
            Uint128::new(1_000_000),
            Uint128::new(2_000_000),
            Uint128::new(1_413_213),
            Uint128::new(500_000),
            Uint128::new(2_000_000),
        )
        .unwrap();
        assert_eq!(a, Uint128::new(500_000));
        assert_eq!(b, Uint128::new(1_000_000));
        assert!(shares > Uint128::zero());
    }

    #[test]
    fn share_of_reserves_is_pro_rata() {
        let (a, b) = share_of_reserves(
            Uint128::new(1_000_000),
            Uint128::new(2_000_000),
            Uint128::new(1_000_000),
            Uint128::new(250_000),
        );
        assert_eq!(a, Uint128::new(250_000));
        assert_eq!(b, Uint128::new(500_000));
    }
}
