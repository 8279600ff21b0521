//! Short-lived replay-prevention set shared by the Oracle (`SubmitPrice`
//! nonces, spec.md §3 "nonces retained in a short-lived replay set (≤ 100
//! blocks)") and the Compute module (`UsedNonces`, spec.md §3/§4.5). Entries
//! are keyed by an opaque `(scope, nonce)` pair so one `Map` can back several
//! independent nonce spaces, and are evicted by height at end-of-block,
//! bounded by `max_per_block` (spec.md §4.5 "Nonce TTL").
use cosmwasm_std::{Order, StdResult, Storage};
use cw_storage_plus::Map;

pub struct NonceSet<'a> {
    map: Map<'a, (String, String), u64>,
}

impl<'a> NonceSet<'a> {
    pub const fn new(namespace: &'a str) -> Self {
        NonceSet {
            map: Map::new(namespace),
        }
    }

    /// Returns `true` and records the nonce if it has not been seen before;
    /// returns `false` without mutating on replay (spec.md §8 invariant 8:
    /// "no duplicate (module, scope, nonce) triple is accepted").
    pub fn record_if_new(
        &self,
        storage: &mut dyn Storage,
        scope: &str,
        nonce: &str,
        created_height: u64,
    ) -> StdResult<bool> {
        let key = (scope.to_string(), nonce.to_string());
        if self.map.has(storage, key.clone()) {
            return Ok(false);
        }
        self.map.save(storage, key, &created_height)?;
        Ok(true)
    }

    /// End-of-block sweep: removes entries older than `ttl_blocks`, capped at
    /// `max_per_block` removals per call (spec.md §4.5).
    pub fn sweep_expired(
        &self,
        storage: &mut dyn Storage,
        current_height: u64,
        ttl_blocks: u64,
        max_per_block: usize,
    ) -> StdResult<usize> {
        let cutoff = current_height.saturating_sub(ttl_blocks);
        let expired: Vec<_> = self
            .map
            .range(storage, None, None, Order::Ascending)
            .filter_map(|item| item.ok())
            .filter(|(_, created)| *created < cutoff)
            .take(max_per_block)
            .map(|(key, _)| key)
            .collect();

        let removed = expired.len();
        for key in expired {
            self.map.remove(storage, key);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::MockStorage;

    #[test]
    fn replay_is_rejected() {
        let set = NonceSet::new("nonces");
        let mut storage = MockStorage::new();
        assert!(set.record_if_new(&mut storage, "BTC", "n1", 10).unwrap());
        assert!(!set.record_if_new(&mut storage, "BTC", "n1", 11).unwrap());
        // Different scope, same nonce string, is a distinct entry.
        assert!(set.record_if_new(&mut storage, "ETH", "n1", 10).unwrap());
    }

    #[test]
    fn sweep_respects_ttl_and_cap() {
        let set = NonceSet::new("nonces");
        let mut storage = MockStorage::new();
        for i in 0..5 {
            set.record_if_new(&mut storage, "BTC", &format!("n{i}"), 0)
                .unwrap();
        }
        let removed = set.sweep_expired(&mut storage, 200, 100, 2).unwrap();
        assert_eq!(removed, 2);
        let removed = set.sweep_expired(&mut storage, 200, 100, 100).unwrap();
        assert_eq!(removed, 3);
    }
}
