//! Token-bucket rate limiter (spec.md §4.5 "Rate limiter"): `capacity`,
//! `refillPerSecond`, `burstAllowance`, pre-decremented atomically within the
//! single-writer block, with an underflow guard. Shared by the Compute
//! defense layer's per-provider limiter; the DEX defense layer's flash-loan
//! lockout (spec.md §4.2) reuses the same primitive at a coarser grain.
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Uint128;

#[cw_serde]
pub struct TokenBucket {
    pub capacity: Uint128,
    pub refill_per_second: Uint128,
    pub tokens: Uint128,
    pub last_refill: u64,
    /// Extra tokens grantable in a single burst beyond `capacity`, spent
    /// before falling back to the steady-state bucket.
    pub burst_allowance: Uint128,
    pub burst_remaining: Uint128,
}

impl TokenBucket {
    pub fn new(capacity: Uint128, refill_per_second: Uint128, burst_allowance: Uint128, now: u64) -> Self {
        TokenBucket {
            capacity,
            refill_per_second,
            tokens: capacity,
            last_refill: now,
            burst_allowance,
            burst_remaining: burst_allowance,
        }
    }

    fn refill(&mut self, now: u64) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = Uint128::from(now - self.last_refill);
        let refreshed = self.refill_per_second.saturating_mul(elapsed);
        self.tokens = self.tokens.saturating_add(refreshed).min(self.capacity);
        self.burst_remaining = self.burst_allowance;
        self.last_refill = now;
    }

    /// Attempts to consume `cost` tokens at time `now`. Returns `true` (and
    /// commits the decrement) if there was enough budget, `false` (no
    /// mutation) otherwise — the underflow guard from spec.md §4.5.
    pub fn try_consume(&mut self, cost: Uint128, now: u64) -> bool {
        self.refill(now);

        if cost <= self.tokens {
            self.tokens -= cost;
            return true;
        }

        let shortfall = cost - self.tokens;
        if shortfall <= self.burst_remaining {
            self.tokens = Uint128::zero();
            self.burst_remaining -= shortfall;
            return true;
        }

        false
    }
}

/// Fixed hourly/daily caps layered on top of a [`TokenBucket`] (spec.md
/// §4.5: "Separate hourly and daily caps").
#[cw_serde]
pub struct WindowCounter {
    pub window_start: u64,
    pub window_seconds: u64,
    pub limit: u64,
    pub count: u64,
}

impl WindowCounter {
    pub fn new(window_seconds: u64, limit: u64, now: u64) -> Self {
        WindowCounter {
            window_start: now,
            window_seconds,
            limit,
            count: 0,
        }
    }

    pub fn try_increment(&mut self, now: u64) -> bool {
        if now >= self.window_start + self.window_seconds {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.limit {
            return false;
        }
        self.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_until_exhausted_then_blocks() {
        let mut bucket = TokenBucket::new(Uint128::new(10), Uint128::new(1), Uint128::zero(), 0);
        for _ in 0..10 {
            assert!(bucket.try_consume(Uint128::one(), 0));
        }
        assert!(!bucket.try_consume(Uint128::one(), 0));
    }

    #[test]
    fn refill_restores_budget_over_time() {
        let mut bucket = TokenBucket::new(Uint128::new(10), Uint128::new(1), Uint128::zero(), 0);
        bucket.try_consume(Uint128::new(10), 0);
        assert!(!bucket.try_consume(Uint128::one(), 0));
        assert!(bucket.try_consume(Uint128::one(), 5));
    }

    #[test]
    fn burst_allowance_covers_one_off_spike() {
        let mut bucket = TokenBucket::new(Uint128::new(5), Uint128::zero(), Uint128::new(3), 0);
        bucket.try_consume(Uint128::new(5), 0);
        assert!(bucket.try_consume(Uint128::new(3), 0));
        assert!(!bucket.try_consume(Uint128::one(), 0));
    }

    #[test]
    fn window_counter_resets_after_window_elapses() {
        let mut counter = WindowCounter::new(3600, 2, 0);
        assert!(counter.try_increment(0));
        assert!(counter.try_increment(10));
        assert!(!counter.try_increment(20));
        assert!(counter.try_increment(3601));
    }
}
