use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::order::OrderId;

/// One async mutex per order id, created on demand and dropped once nobody
/// holds or waits for it. Different ids never contend.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<OrderId, Arc<AsyncMutex<()>>>>,
}

pub struct KeyedGuard<'a> {
    // Declared before `_claim` so the mutex is released before the claim
    // looks at the slot's reference count.
    _guard: OwnedMutexGuard<()>,
    _claim: Claim<'a>,
}

/// Interest in one slot, held while waiting and while locked. Whoever drops
/// the last claim on a slot removes it from the map, so a waiter cancelled
/// after the holder left does not strand the entry.
struct Claim<'a> {
    locks: &'a KeyedLocks,
    key: OrderId,
    slot: Arc<AsyncMutex<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &OrderId) -> KeyedGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.clone()).or_default().clone()
        };
        let claim = Claim {
            locks: self,
            key: key.clone(),
            slot,
        };

        let guard = claim.slot.clone().lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _claim: claim,
        }
    }

    /// Ids that currently have a holder or waiter.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        // Clones are only handed out under the map lock. Two references left
        // means the map's and this claim's: nobody else holds or waits.
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let last = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if last {
            slots.remove(&self.key);
        }
    }
}
