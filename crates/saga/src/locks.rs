//! In-process serialisation of sagas that touch the same lot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::LotId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per lot ID, created on demand and dropped when unused.
#[derive(Debug, Clone, Default)]
pub struct LotLocks {
    locks: Arc<Mutex<HashMap<LotId, Arc<AsyncMutex<()>>>>>,
}

impl LotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other saga holds `lot_id`.
    pub async fn acquire(&self, lot_id: LotId) -> LotGuard {
        let lock = self.map().entry(lot_id).or_default().clone();
        let guard = lock.lock_owned().await;
        LotGuard {
            guard: Some(guard),
            lot_id,
            locks: self.clone(),
        }
    }

    /// Number of lots currently locked or waited on.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> MutexGuard<'_, HashMap<LotId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a lot until dropped.
#[derive(Debug)]
pub struct LotGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lot_id: LotId,
    locks: LotLocks,
}

impl LotGuard {
    pub fn lot_id(&self) -> LotId {
        self.lot_id
    }
}

impl Drop for LotGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.map();
        // Only the map still references the mutex: nobody holds or awaits it.
        if map
            .get(&self.lot_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.lot_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_lot_is_exclusive() {
        let locks = LotLocks::new();
        let lot_id = LotId::new();

        let first = locks.acquire(lot_id).await;
        let waiting = tokio::time::timeout(Duration::from_millis(20), locks.acquire(lot_id)).await;
        assert!(waiting.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(lot_id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_lots_do_not_block() {
        let locks = LotLocks::new();
        let _a = locks.acquire(LotId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(20), locks.acquire(LotId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_unused_locks_are_removed() {
        let locks = LotLocks::new();
        let guard = locks.acquire(LotId::new()).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }
}
