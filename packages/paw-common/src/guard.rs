//! Reentrancy guard shared by every mutating handler in the DEX, Oracle and
//! Compute modules (spec.md §4.2 "Reentrancy guard"): a per-module boolean
//! lock set at handler entry and cleared on return. Nested entry fails with
//! the caller's `ErrReentrancy`. Because the lock lives in `deps.storage`,
//! an error return reverts the whole transactional branch (spec.md §5),
//! which clears the lock for free — callers only need to clear it explicitly
//! on the success path.
use cosmwasm_std::{StdResult, Storage};
use cw_storage_plus::Item;

pub struct ReentrancyGuard {
    lock: Item<'static, bool>,
}

impl ReentrancyGuard {
    pub const fn new(key: &'static str) -> Self {
        ReentrancyGuard {
            lock: Item::new(key),
        }
    }

    /// Call at the top of every mutating handler. Returns `Err` (via
    /// `on_locked`) if the guard is already held.
    pub fn enter<E>(&self, storage: &mut dyn Storage, on_locked: E) -> Result<(), E> {
        let locked = self.lock.load(storage).unwrap_or(false);
        if locked {
            return Err(on_locked);
        }
        self.lock.save(storage, &true).map_err(|_| on_locked)?;
        Ok(())
    }

    /// Call before returning `Ok` from the handler.
    pub fn exit(&self, storage: &mut dyn Storage) -> StdResult<()> {
        self.lock.save(storage, &false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::MockStorage;

    #[derive(Debug, PartialEq)]
    struct Locked;

    #[test]
    fn nested_entry_is_rejected() {
        let guard = ReentrancyGuard::new("guard");
        let mut storage = MockStorage::new();
        guard.enter(&mut storage, Locked).unwrap();
        assert_eq!(guard.enter(&mut storage, Locked), Err(Locked));
        guard.exit(&mut storage).unwrap();
        assert!(guard.enter(&mut storage, Locked).is_ok());
    }
}
