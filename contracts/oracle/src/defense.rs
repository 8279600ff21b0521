//! Oracle defense layer: outlier rejection (IQR + sigma), stake
//! concentration / geographic diversity gates, TWAP ring, asset-level
//! circuit breaker, replay nonce set and per-validator rate limiting
//! (spec.md §4.3 "Circuit breaker", §4.5 "Rate limiter", §9).
use cosmwasm_std::{Decimal, Event, Storage, Uint128};

use paw_buffer::{CircularBufferMulti, RingManager};
use paw_common::common::SecurityBounded;
use paw_common::event::{attr, ty};
use paw_common::math::{stddev, variance};
use paw_common::nonce::NonceSet;
use paw_common::ratelimit::TokenBucket;

use crate::error::ContractError;
use crate::state::{
    BreakerReason, CircuitBreakerState, GeoRegion, Observation, Params, CIRCUIT_BREAKERS,
};

const TWAP_RING: CircularBufferMulti<String, Observation> =
    CircularBufferMulti::new("oracle_twap_state", "oracle_twap_array");

const NONCES: NonceSet = NonceSet::new("oracle_nonces");

const SUBMIT_RATE_LIMIT: cw_storage_plus::Map<&cosmwasm_std::Addr, TokenBucket> =
    cw_storage_plus::Map::new("oracle_submit_rate");

impl SecurityBounded for Params {
    fn check_security_bounds(&self) -> cosmwasm_std::StdResult<()> {
        if self.min_validators_for_security < crate::state::floors::MIN_VALIDATORS_FOR_SECURITY_FLOOR
        {
            return Err(cosmwasm_std::StdError::generic_err(
                "min_validators_for_security below security floor",
            ));
        }
        Ok(())
    }
}

pub fn init_twap_ring(
    storage: &mut dyn Storage,
    asset: &str,
    capacity: u32,
) -> Result<(), ContractError> {
    RingManager::init_if_absent(storage, TWAP_RING, asset.to_string(), capacity)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

pub fn record_observation(
    storage: &mut dyn Storage,
    asset: &str,
    height: u64,
    time: u64,
    price: Decimal,
) -> Result<(), ContractError> {
    let mut ring = RingManager::new(storage, TWAP_RING, asset.to_string())
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))?;
    ring.push(Observation {
        height,
        time,
        price,
    });
    ring.commit(storage)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

pub fn twap_samples(storage: &dyn Storage, asset: &str) -> Result<Vec<Observation>, ContractError> {
    let ring = RingManager::new(storage, TWAP_RING, asset.to_string())
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))?;
    ring.read_all(storage)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

pub fn twap_price(samples: &[Observation]) -> Decimal {
    if samples.is_empty() {
        return Decimal::zero();
    }
    let sum = samples.iter().fold(Decimal::zero(), |acc, s| acc + s.price);
    sum / Decimal::from_ratio(samples.len() as u128, 1u128)
}

/// Nonce replay guard for `SubmitPrice` (spec.md §3 "nonces retained in a
/// short-lived replay set"). Returns `Ok(())` and records the nonce, or
/// `Err(ErrReplayedNonce)` on replay.
pub fn assert_nonce_fresh(
    storage: &mut dyn Storage,
    asset: &str,
    nonce: &str,
    height: u64,
) -> Result<(), ContractError> {
    let is_new = NONCES
        .record_if_new(storage, asset, nonce, height)
        .map_err(ContractError::Std)?;
    if !is_new {
        return Err(ContractError::ReplayedNonce {});
    }
    Ok(())
}

pub fn sweep_expired_nonces(
    storage: &mut dyn Storage,
    current_height: u64,
    ttl_blocks: u64,
    max_per_block: usize,
) -> Result<usize, ContractError> {
    NONCES
        .sweep_expired(storage, current_height, ttl_blocks, max_per_block)
        .map_err(ContractError::Std)
}

/// Token-bucket submission limiter (spec.md §4.5), one bucket per validator
/// shared across all assets: a validator flooding submissions for many
/// assets in one block is the same resource-exhaustion pattern the Compute
/// module's per-provider bucket guards against.
pub fn assert_submit_rate_allowed(
    storage: &mut dyn Storage,
    validator: &cosmwasm_std::Addr,
    now: u64,
) -> Result<(), ContractError> {
    let mut bucket = SUBMIT_RATE_LIMIT
        .may_load(storage, validator)?
        .unwrap_or_else(|| TokenBucket::new(Uint128::new(20), Uint128::new(1), Uint128::new(5), now));
    if !bucket.try_consume(Uint128::one(), now) {
        return Err(ContractError::RateLimited {});
    }
    SUBMIT_RATE_LIMIT.save(storage, validator, &bucket)?;
    Ok(())
}

fn plain_median(sorted_prices: &[Decimal]) -> Decimal {
    let n = sorted_prices.len();
    if n == 0 {
        return Decimal::zero();
    }
    if n % 2 == 1 {
        sorted_prices[n / 2]
    } else {
        (sorted_prices[n / 2 - 1] + sorted_prices[n / 2]) / Decimal::from_ratio(2u128, 1u128)
    }
}

/// Submit-time outlier gate (spec.md §4.3 `SubmitPrice`: "Fails `ErrOutlier`
/// if the submission is further than `OutlierStdDevs` ... from the median of
/// the current window, when at least `MinValidatorsForSecurity` are
/// submitting"). `window_prices` is every other validator's fresh submission
/// for this asset; the caller gates the call on the submitter count
/// (`window_prices.len() + 1`) already meeting `min_validators_for_security`.
/// Unlike `aggregate`'s stake-weighted IQR/sigma pass, this is a plain
/// median/stddev check against the window as it stands before this
/// submission lands — a cheap per-message sanity gate, not the authoritative
/// filter (that still runs at aggregation time).
pub fn assert_not_outlier_vs_window(
    window_prices: &[Decimal],
    candidate_price: Decimal,
    params: &Params,
) -> Result<(), ContractError> {
    let mut sorted = window_prices.to_vec();
    sorted.sort_by(|a, b| a.cmp(b));
    let median = plain_median(&sorted);
    let mean = if sorted.is_empty() {
        Decimal::zero()
    } else {
        let sum = sorted.iter().fold(Decimal::zero(), |acc, p| acc + *p);
        sum / Decimal::from_ratio(sorted.len() as u128, 1u128)
    };
    let sigma = match stddev(&sorted, mean) {
        Some(sd) => sd,
        None => mean * Decimal::from_ratio(params.conservative_fallback_stddev_bps, 10_000u128),
    };
    let sigma_multiple = Decimal::from_ratio(params.outlier_std_devs_bps, 10_000u128);
    let band = sigma * sigma_multiple;
    let diff = if candidate_price > median {
        candidate_price - median
    } else {
        median - candidate_price
    };
    if diff > band {
        return Err(ContractError::OutlierDetected {});
    }
    Ok(())
}

/// One validator's submission, carried through the aggregation pipeline.
#[derive(Clone)]
pub struct Candidate {
    pub validator: cosmwasm_std::Addr,
    pub price: Decimal,
    pub stake: Uint128,
}

/// Stake-weighted rank position used for `Q1`/`Q3`/median, linearly
/// interpolating between the two candidates straddling the target rank
/// (spec.md §4.3 step 3: "stake-weighted quartiles ... with linear
/// interpolation at exact rank positions").
fn stake_weighted_percentile(sorted: &[Candidate], total_stake: Uint128, fraction: Decimal) -> Decimal {
    if sorted.is_empty() {
        return Decimal::zero();
    }
    if sorted.len() == 1 {
        return sorted[0].price;
    }
    let target = Decimal::from_ratio(total_stake, 1u128) * fraction;
    let mut cumulative = Decimal::zero();
    for window in sorted.windows(2) {
        let next_cumulative = cumulative + Decimal::from_ratio(window[0].stake, 1u128);
        if next_cumulative >= target {
            let progress = if next_cumulative > cumulative {
                (target - cumulative) / (next_cumulative - cumulative).max(Decimal::permille(1))
            } else {
                Decimal::zero()
            };
            let diff = if window[1].price > window[0].price {
                window[1].price - window[0].price
            } else {
                window[0].price - window[1].price
            };
            return if window[1].price >= window[0].price {
                window[0].price + diff * progress.min(Decimal::one())
            } else {
                window[0].price - diff * progress.min(Decimal::one())
            };
        }
        cumulative = next_cumulative;
    }
    sorted.last().unwrap().price
}

pub struct AggregationOutcome {
    pub price: Decimal,
    pub kept: Vec<Candidate>,
    pub dropped_outliers: Vec<Candidate>,
    pub used_fallback_stddev: bool,
}

/// Runs spec.md §4.3 steps 3-6 over the candidates that already passed the
/// sufficiency gate (validator count, stake concentration, geo diversity).
pub fn aggregate(candidates: Vec<Candidate>, params: &Params) -> AggregationOutcome {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| a.price.cmp(&b.price));
    let total_stake: Uint128 = sorted.iter().fold(Uint128::zero(), |acc, c| acc + c.stake);

    let q1 = stake_weighted_percentile(&sorted, total_stake, Decimal::permille(250));
    let q3 = stake_weighted_percentile(&sorted, total_stake, Decimal::permille(750));
    let iqr = if q3 > q1 { q3 - q1 } else { Decimal::zero() };
    let fence = iqr * Decimal::percent(150);
    let iqr_lower = q1.checked_sub(fence).unwrap_or(Decimal::zero());
    let iqr_upper = q3 + fence;

    let (within_iqr, mut dropped): (Vec<Candidate>, Vec<Candidate>) = sorted
        .into_iter()
        .partition(|c| c.price >= iqr_lower && c.price <= iqr_upper);

    let mean = if within_iqr.is_empty() {
        Decimal::zero()
    } else {
        let sum = within_iqr
            .iter()
            .fold(Decimal::zero(), |acc, c| acc + c.price);
        sum / Decimal::from_ratio(within_iqr.len() as u128, 1u128)
    };
    let prices: Vec<Decimal> = within_iqr.iter().map(|c| c.price).collect();

    let (sigma, used_fallback) = match stddev(&prices, mean) {
        Some(sd) => (sd, false),
        None => (
            mean * Decimal::from_ratio(params.conservative_fallback_stddev_bps, 10_000u128),
            true,
        ),
    };

    let sigma_multiple = Decimal::from_ratio(params.outlier_std_devs_bps, 10_000u128);
    let band = sigma * sigma_multiple;
    let sigma_lower = mean.checked_sub(band).unwrap_or(Decimal::zero());
    let sigma_upper = mean + band;

    let (kept, dropped_by_sigma): (Vec<Candidate>, Vec<Candidate>) = within_iqr
        .into_iter()
        .partition(|c| c.price >= sigma_lower && c.price <= sigma_upper);
    dropped.extend(dropped_by_sigma);

    let kept_total_stake: Uint128 = kept.iter().fold(Uint128::zero(), |acc, c| acc + c.stake);
    let price = stake_weighted_percentile(&kept, kept_total_stake, Decimal::permille(500));

    AggregationOutcome {
        price,
        kept,
        dropped_outliers: dropped,
        used_fallback_stddev: used_fallback,
    }
}

/// Stake concentration check: rejects aggregation when the single largest
/// submitter controls more than `MaxStakeConcentration` of total submitted
/// stake (spec.md §4.3 step 2).
pub fn stake_concentration_bps(candidates: &[Candidate]) -> u16 {
    let total: Uint128 = candidates.iter().fold(Uint128::zero(), |acc, c| acc + c.stake);
    if total.is_zero() {
        return 0;
    }
    let max_stake = candidates.iter().map(|c| c.stake).max().unwrap_or_default();
    max_stake
        .multiply_ratio(10_000u128, total)
        .u128()
        .min(10_000) as u16
}

pub fn distinct_regions(regions: &[Option<GeoRegion>]) -> usize {
    let mut seen: Vec<&GeoRegion> = Vec::new();
    for r in regions.iter().flatten() {
        if !seen.iter().any(|s| format!("{s:?}") == format!("{r:?}")) {
            seen.push(r);
        }
    }
    seen.len()
}

/// Checks the aggregated price move against the previous aggregated price
/// and trips the asset breaker if it exceeds `breaker_threshold_bps`
/// (spec.md §4.3 "Circuit breaker: Mirrors the DEX breaker but at asset
/// granularity").
pub fn maybe_trip_breaker(
    storage: &mut dyn Storage,
    asset: &str,
    params: &Params,
    now_time: u64,
    previous_price: Decimal,
    new_price: Decimal,
) -> Result<Option<Event>, ContractError> {
    if previous_price.is_zero() {
        return Ok(None);
    }
    let diff = if new_price > previous_price {
        new_price - previous_price
    } else {
        previous_price - new_price
    };
    let move_fraction = diff / previous_price;
    let threshold = Decimal::from_ratio(params.breaker_threshold_bps as u128, 10_000u128);
    if move_fraction <= threshold {
        return Ok(None);
    }

    let resume_at = now_time + params.cooldown_period_blocks;
    let state = CircuitBreakerState {
        tripped: true,
        reason: Some(BreakerReason::PriceMoveBetweenBlocks),
        tripped_at: Some(now_time),
        tripped_price: Some(new_price),
        resume_at: Some(resume_at),
        gradual_until: Some(resume_at + 3_600),
    };
    CIRCUIT_BREAKERS.save(storage, asset, &state)?;
    Ok(Some(
        Event::new(ty::CIRCUIT_BREAKER_TRIPPED)
            .add_attribute(attr::ASSET, asset)
            .add_attribute(attr::REASON, format!("{:?}", state.reason)),
    ))
}

/// Gates `QueryPrice`/aggregation publication while the breaker is tripped
/// (spec.md §8 invariant 5, adapted to asset granularity).
pub fn assert_breaker_allows_publish(
    storage: &mut dyn Storage,
    asset: &str,
    now_time: u64,
) -> Result<(), ContractError> {
    let mut state = CIRCUIT_BREAKERS.may_load(storage, asset)?.unwrap_or_default();
    if !state.tripped {
        return Ok(());
    }
    let resume_at = state.resume_at.unwrap_or(u64::MAX);
    if now_time < resume_at {
        return Err(ContractError::CircuitBreakerTripped {});
    }
    state.tripped = false;
    state.resume_at = None;
    state.gradual_until = None;
    CIRCUIT_BREAKERS.save(storage, asset, &state)?;
    Ok(())
}

pub fn force_resume(storage: &mut dyn Storage, asset: &str) -> Result<(), ContractError> {
    let mut state = CIRCUIT_BREAKERS.may_load(storage, asset)?.unwrap_or_default();
    state.tripped = false;
    state.resume_at = None;
    state.gradual_until = None;
    state.reason = Some(BreakerReason::Governance);
    CIRCUIT_BREAKERS.save(storage, asset, &state)?;
    Ok(())
}

/// Slash fraction scaled to deviation severity (spec.md §4.3 "Slashing":
/// "fraction scaled (1-10%) to deviation severity"), linear between the
/// configured min/max over `misses` past the slashing threshold, saturating
/// at `slash_fraction_max_bps` once `misses` reaches double the threshold.
pub fn slash_fraction(misses: u32, params: &Params) -> Decimal {
    let threshold = params.slashing_threshold_misses.max(1);
    let over = misses.saturating_sub(threshold);
    let span = threshold.max(1);
    let ratio = Decimal::from_ratio(over.min(span) as u128, span as u128);
    let min = Decimal::from_ratio(params.slash_fraction_min_bps as u128, 10_000u128);
    let max = Decimal::from_ratio(params.slash_fraction_max_bps as u128, 10_000u128);
    min + (max - min) * ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(validator: &str, price: u128, stake: u128) -> Candidate {
        Candidate {
            validator: cosmwasm_std::Addr::unchecked(validator),
            price: Decimal::from_ratio(price, 1u128),
            stake: Uint128::new(stake),
        }
    }

    /// S4: seven validators submit BTC/USD as {60000..60050 in steps of 10,
    /// 150000}; aggregation must drop 150000 and publish near 60030.
    #[test]
    fn s4_outlier_is_dropped_and_median_is_near_60030() {
        let candidates = vec![
            candidate("v1", 60_000, 100),
            candidate("v2", 60_010, 100),
            candidate("v3", 60_020, 100),
            candidate("v4", 60_030, 100),
            candidate("v5", 60_040, 100),
            candidate("v6", 60_050, 100),
            candidate("v7", 150_000, 100),
        ];
        let params = Params::default();
        let outcome = aggregate(candidates, &params);
        assert_eq!(outcome.dropped_outliers.len(), 1);
        assert_eq!(outcome.dropped_outliers[0].validator.as_str(), "v7");
        let diff = if outcome.price > Decimal::from_ratio(60_030u128, 1u128) {
            outcome.price - Decimal::from_ratio(60_030u128, 1u128)
        } else {
            Decimal::from_ratio(60_030u128, 1u128) - outcome.price
        };
        assert!(diff < Decimal::from_ratio(50u128, 1u128));
    }

    #[test]
    fn stake_concentration_flags_dominant_submitter() {
        let candidates = vec![candidate("v1", 100, 900), candidate("v2", 101, 100)];
        assert_eq!(stake_concentration_bps(&candidates), 9_000);
    }

    #[test]
    fn slash_fraction_scales_with_deviation_and_saturates() {
        let params = Params::default();
        let low = slash_fraction(params.slashing_threshold_misses, &params);
        let high = slash_fraction(params.slashing_threshold_misses * 3, &params);
        assert_eq!(low, Decimal::percent(1));
        assert_eq!(high, Decimal::percent(10));
    }
}
