use cosmwasm_std::{Decimal, Uint128, Uint256};
use integer_sqrt::IntegerSquareRoot;

/// Addition where, on overflow, the excess wraps back from zero. Used by the
/// TWAP ring's cumulative price accumulators, which are expected to wrap over
/// the lifetime of a long-running pool (grounded on the teacher's identical
/// helper for `price_cumulative_last`).
pub fn warp_add(a: Uint128, b: Uint128) -> Uint128 {
    let diff = Uint128::MAX - a;
    if b <= diff {
        a + b
    } else {
        b - diff
    }
}

/// Integer square root used by `CreatePool` to compute the initial LP share
/// mint (spec.md §4.1: `sqrt(depositA·depositB) − MINIMUM_LIQUIDITY`).
pub fn isqrt(value: Uint128) -> Uint128 {
    Uint128::new(value.u128().integer_sqrt())
}

/// Integer square root over `Uint256`, used where a product of two `Uint128`
/// reserves (up to ~1.16e77) would overflow `u128` before `isqrt` could run —
/// the same overflow the teacher avoids by widening into `U256` before taking
/// a pool's initial share count. `integer-sqrt` only covers primitive integer
/// types, so this is a plain deterministic binary search, one bit at a time.
pub fn isqrt_u256(value: Uint256) -> Uint128 {
    if value.is_zero() {
        return Uint128::zero();
    }
    let mut lo = Uint256::zero();
    let mut hi = value;
    while lo < hi {
        let mid = (lo + hi + Uint256::one()) / Uint256::from(2u8);
        if mid * mid <= value {
            lo = mid;
        } else {
            hi = mid - Uint256::one();
        }
    }
    Uint128::try_from(lo).unwrap_or(Uint128::MAX)
}

/// Fixed iteration count for the Newton-Raphson `Decimal` sqrt below. The
/// method converges quadratically, so this comfortably exceeds what full
/// 18-decimal-digit precision needs even from a poor initial guess; a fixed
/// count (rather than iterate-until-epsilon) keeps the routine deterministic
/// for consensus, per spec.md §5 ("must be deterministic in its externally
/// visible effects").
const SQRT_NEWTON_ITERATIONS: u32 = 64;

/// `ApproxSqrt` over a `Decimal`, used by the Oracle's standard-deviation
/// computation (spec.md §4.3 step 5/6 and §9: "requires standard deviation
/// (`sqrt(variance)`)"). Implemented via fixed-iteration Newton-Raphson using
/// only `Decimal` arithmetic (which itself guards against overflow via a
/// widening intermediate), rather than scaling into the integer domain,
/// since `value · 1e18` overflows `u128` for any `value` above roughly `1e20`.
/// Returns `None` on overflow/failure so the caller can fall back to a
/// conservative assumed volatility rather than silently returning zero
/// (spec.md §7).
pub fn approx_sqrt_decimal(value: Decimal) -> Option<Decimal> {
    if value.is_zero() {
        return Some(Decimal::zero());
    }

    let mut guess = if value > Decimal::one() {
        value
    } else {
        Decimal::one()
    };

    for _ in 0..SQRT_NEWTON_ITERATIONS {
        let quotient = value.checked_div(guess).ok()?;
        let sum = guess.checked_add(quotient).ok()?;
        guess = sum / Decimal::from_ratio(2u128, 1u128);
    }

    Some(guess)
}

/// Population variance of a set of prices expressed in `Decimal`.
pub fn variance(values: &[Decimal], mean: Decimal) -> Decimal {
    if values.is_empty() {
        return Decimal::zero();
    }
    let sum_sq_diff: Decimal = values
        .iter()
        .map(|v| {
            let diff = if *v > mean { *v - mean } else { mean - *v };
            diff * diff
        })
        .fold(Decimal::zero(), |acc, v| acc + v);
    sum_sq_diff / Decimal::from_ratio(values.len() as u128, 1u128)
}

/// Standard deviation, computed strictly as `sqrt(variance)` per spec.md §9
/// ("some historical code used variance in place of standard deviation ...
/// this spec requires standard deviation"). Returns `None` if the sqrt
/// approximation fails; callers must use a conservative fallback, never zero.
pub fn stddev(values: &[Decimal], mean: Decimal) -> Option<Decimal> {
    approx_sqrt_decimal(variance(values, mean))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_matches_expected() {
        assert_eq!(isqrt(Uint128::new(2_000_000_000_000)), Uint128::new(1_414_213));
    }

    #[test]
    fn isqrt_u256_matches_isqrt_for_u128_range_values() {
        let value = Uint256::from(2_000_000_000_000u128);
        assert_eq!(isqrt_u256(value), Uint128::new(1_414_213));
    }

    #[test]
    fn isqrt_u256_handles_products_that_overflow_u128() {
        // (2^100)^2 comfortably overflows u128 but fits in Uint256.
        let base = Uint256::from(1u128) << 100u32;
        let squared = base * base;
        assert_eq!(isqrt_u256(squared), Uint128::try_from(base).unwrap());
    }

    #[test]
    fn stddev_of_constant_series_is_zero() {
        let values = vec![Decimal::percent(100); 5];
        let sd = stddev(&values, Decimal::percent(100)).unwrap();
        assert_eq!(sd, Decimal::zero());
    }

    #[test]
    fn stddev_is_sqrt_of_variance_not_variance_itself() {
        let values = vec![
            Decimal::from_ratio(60000u128, 1u128),
            Decimal::from_ratio(60010u128, 1u128),
            Decimal::from_ratio(60020u128, 1u128),
        ];
        let mean = Decimal::from_ratio(60010u128, 1u128);
        let var = variance(&values, mean);
        let sd = stddev(&values, mean).unwrap();
        // For a non-trivial spread, sqrt(variance) must be strictly smaller
        // than variance itself whenever variance > 1, guarding against the
        // historical variance/stddev confusion called out in spec.md §9.
        assert!(sd < var);
    }
}
