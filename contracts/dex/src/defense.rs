//! Per-pool defense layer: circuit breaker, TWAP ring, flash-loan heuristic
//! and drain limiter (spec.md §4.2).

use cosmwasm_std::{Decimal, Event, Storage, Uint128};

use paw_buffer::{CircularBufferMulti, RingManager};
use paw_common::event::{attr, ty};

use crate::error::ContractError;
use crate::state::{
    BreakerReason, CircuitBreakerState, Observation, Params, Pool, CIRCUIT_BREAKERS,
    LAST_LARGE_INTERACTION, SWAPS_THIS_BLOCK,
};

const TWAP_RING: CircularBufferMulti<u64, Observation> =
    CircularBufferMulti::new("dex_twap_state", "dex_twap_array");

/// Assumed seconds between price-move windows, used to turn spec.md's
/// "1m/5m/15m/1h" windows into a lookback against `Observation::time`.
const WINDOW_1M_SECONDS: u64 = 60;
const WINDOW_5M_SECONDS: u64 = 5 * 60;
const WINDOW_15M_SECONDS: u64 = 15 * 60;
const WINDOW_1H_SECONDS: u64 = 60 * 60;

pub fn init_twap_ring(
    storage: &mut dyn Storage,
    pool_id: u64,
    capacity: u32,
) -> Result<(), ContractError> {
    RingManager::init_if_absent(storage, TWAP_RING, pool_id, capacity)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

pub fn record_observation(
    storage: &mut dyn Storage,
    pool_id: u64,
    height: u64,
    time: u64,
    reserve_a: Uint128,
    reserve_b: Uint128,
) -> Result<(), ContractError> {
    let mut ring = RingManager::new(storage, TWAP_RING, pool_id)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))?;
    let price_a_per_b = Decimal::from_ratio(reserve_b, reserve_a.max(Uint128::one()));
    ring.push(Observation {
        height,
        time,
        reserve_a,
        reserve_b,
        price_a_per_b,
    });
    ring.commit(storage)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

pub fn twap_samples(storage: &dyn Storage, pool_id: u64) -> Result<Vec<Observation>, ContractError> {
    let ring = RingManager::new(storage, TWAP_RING, pool_id)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))?;
    ring.read_all(storage)
        .map_err(|e| ContractError::Std(cosmwasm_std::StdError::generic_err(e.to_string())))
}

/// Time-weighted average of `price_a_per_b` over whatever samples are in the ring.
/// A simple arithmetic mean over stored samples, since samples are taken once per
/// swap rather than at fixed intervals (a true time-integral would need interpolation
/// the ring doesn't currently carry enough information to do soundly).
pub fn twap_price(samples: &[Observation]) -> Decimal {
    if samples.is_empty() {
        return Decimal::zero();
    }
    let sum = samples
        .iter()
        .fold(Decimal::zero(), |acc, s| acc + s.price_a_per_b);
    sum / Decimal::from_ratio(samples.len() as u128, 1u128)
}

/// Price move (as a fraction) over a window of `window_seconds` leading up to `now_time`,
/// compared against the oldest sample still inside the window.
fn price_move_over_window(samples: &[Observation], now_time: u64, window_seconds: u64) -> Decimal {
    let cutoff = now_time.saturating_sub(window_seconds);
    let in_window: Vec<&Observation> = samples.iter().filter(|s| s.time >= cutoff).collect();
    if in_window.len() < 2 {
        return Decimal::zero();
    }
    let oldest = in_window.iter().min_by_key(|s| s.time).unwrap();
    let newest = in_window.iter().max_by_key(|s| s.time).unwrap();
    if oldest.price_a_per_b.is_zero() {
        return Decimal::zero();
    }
    let diff = if newest.price_a_per_b > oldest.price_a_per_b {
        newest.price_a_per_b - oldest.price_a_per_b
    } else {
        oldest.price_a_per_b - newest.price_a_per_b
    };
    diff / oldest.price_a_per_b
}

/// Checks the four breaker windows against the just-recorded samples and trips the
/// breaker (spec.md §4.2) if any threshold is exceeded. Called after recording the
/// current swap's observation, so the new sample participates in the window.
pub fn maybe_trip_breaker(
    storage: &mut dyn Storage,
    pool_id: u64,
    params: &Params,
    now_time: u64,
) -> Result<Option<Event>, ContractError> {
    let samples = twap_samples(storage, pool_id)?;
    let windows = [
        (
            WINDOW_1M_SECONDS,
            params.breaker_threshold_1m_bps,
            BreakerReason::PriceMove1m,
        ),
        (
            WINDOW_5M_SECONDS,
            params.breaker_threshold_5m_bps,
            BreakerReason::PriceMove5m,
        ),
        (
            WINDOW_15M_SECONDS,
            params.breaker_threshold_15m_bps,
            BreakerReason::PriceMove15m,
        ),
        (
            WINDOW_1H_SECONDS,
            params.breaker_threshold_1h_bps,
            BreakerReason::PriceMove1h,
        ),
    ];

    for (window_seconds, threshold_bps, reason) in windows {
        let move_fraction = price_move_over_window(&samples, now_time, window_seconds);
        let threshold = Decimal::permille(threshold_bps as u64 / 10);
        if move_fraction > threshold {
            let resume_at = now_time + params.cooldown_period_blocks;
            let state = CircuitBreakerState {
                tripped: true,
                reason: Some(reason),
                tripped_at: Some(now_time),
                tripped_price: samples.last().map(|s| s.price_a_per_b),
                resume_at: Some(resume_at),
                gradual_until: Some(resume_at + WINDOW_1H_SECONDS),
            };
            CIRCUIT_BREAKERS.save(storage, pool_id, &state)?;
            let event = Event::new(ty::CIRCUIT_BREAKER_TRIPPED)
                .add_attribute(attr::POOL_ID, pool_id.to_string())
                .add_attribute(attr::REASON, format!("{:?}", state.reason));
            return Ok(Some(event));
        }
    }
    Ok(None)
}

/// Enforces spec.md §4.2's breaker gate on swap entry: rejects outright while tripped
/// and within `resumeAt`; caps `amount_in` during the gradual-resume window; clears the
/// breaker once `gradualUntil` passes.
pub fn assert_breaker_allows_swap(
    storage: &mut dyn Storage,
    pool_id: u64,
    params: &Params,
    now_time: u64,
    amount_in: Uint128,
    reserve_in: Uint128,
) -> Result<(), ContractError> {
    let mut state = CIRCUIT_BREAKERS
        .may_load(storage, pool_id)?
        .unwrap_or_default();
    if !state.tripped {
        return Ok(());
    }

    let resume_at = state.resume_at.unwrap_or(u64::MAX);
    if now_time < resume_at {
        return Err(ContractError::CircuitBreakerTripped {});
    }

    let gradual_until = state.gradual_until.unwrap_or(u64::MAX);
    if now_time < gradual_until {
        let cap = reserve_in.multiply_ratio(params.resume_volume_factor_bps as u128, 10_000u128);
        if amount_in > cap {
            return Err(ContractError::PoolDrain {});
        }
        return Ok(());
    }

    state.tripped = false;
    state.resume_at = None;
    state.gradual_until = None;
    CIRCUIT_BREAKERS.save(storage, pool_id, &state)?;
    Ok(())
}

pub fn force_resume(storage: &mut dyn Storage, pool_id: u64) -> Result<(), ContractError> {
    let mut state = CIRCUIT_BREAKERS
        .may_load(storage, pool_id)?
        .unwrap_or_default();
    state.tripped = false;
    state.resume_at = None;
    state.gradual_until = None;
    state.reason = Some(BreakerReason::Governance);
    CIRCUIT_BREAKERS.save(storage, pool_id, &state)?;
    Ok(())
}

/// Hard cap on `amount_out / reserve_out` regardless of what the AMM curve permits
/// (spec.md §4.2 "Drain limiter").
pub fn assert_drain_limit(
    amount_out: Uint128,
    reserve_out: Uint128,
    params: &Params,
) -> Result<(), ContractError> {
    let cap = reserve_out.multiply_ratio(params.max_pool_drain_percent_bps as u128, 10_000u128);
    if amount_out > cap {
        return Err(ContractError::PoolDrain {});
    }
    Ok(())
}

/// Same-block swap counter for the "more than 3 swaps in the same block" flash-loan
/// heuristic signal (spec.md §4.2(c)).
pub fn bump_same_block_swap_count(
    storage: &mut dyn Storage,
    pool_id: u64,
    height: u64,
) -> Result<u32, ContractError> {
    let count = SWAPS_THIS_BLOCK
        .may_load(storage, (pool_id, height))?
        .unwrap_or(0)
        + 1;
    SWAPS_THIS_BLOCK.save(storage, (pool_id, height), &count)?;
    Ok(count)
}

/// Flags and, once flagged, locks out further large swaps by the same address on this
/// pool for `flash_loan_protection_blocks` (spec.md §4.2 "Flash-loan heuristic"). The
/// triggering swap itself is allowed through (flagging doesn't reject in isolation);
/// a further large swap observed inside an active lockout is rejected.
pub fn flash_loan_guard(
    storage: &mut dyn Storage,
    pool: &Pool,
    sender: &cosmwasm_std::Addr,
    amount_in: Uint128,
    reserve_in: Uint128,
    height: u64,
    same_block_swaps: u32,
    params: &Params,
) -> Result<Option<Event>, ContractError> {
    let threshold = reserve_in.multiply_ratio(params.flash_loan_threshold_bps as u128, 10_000u128);
    let is_large = amount_in > threshold;
    let flagged_by_density = same_block_swaps > 3;

    if let Some(last_large_height) =
        LAST_LARGE_INTERACTION.may_load(storage, (pool.id, sender))?
    {
        let lockout_until = last_large_height + params.flash_loan_protection_blocks;
        if is_large && height < lockout_until {
            return Err(ContractError::FlashLoanLockout {});
        }
    }

    if is_large || flagged_by_density {
        LAST_LARGE_INTERACTION.save(storage, (pool.id, sender), &height)?;
        let event = Event::new(ty::FLASH_LOAN_DETECTED)
            .add_attribute(attr::POOL_ID, pool.id.to_string())
            .add_attribute(attr::OWNER, sender.to_string())
            .add_attribute(attr::AMOUNT_IN, amount_in.to_string());
        return Ok(Some(event));
    }

    Ok(None)
}
