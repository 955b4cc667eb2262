//! Per-order (and per-courier) logical locking (§5: "the engine acquires a
//! per-order logical lock ... before reading or mutating any of its legs").
//!
//! Embedded SurrealDB over the RocksDB backend has no `SELECT ... FOR
//! UPDATE`, so this striped mutex table stands in for the row-lock the spec
//! describes: concurrent scans against the same order serialize through the
//! same `tokio::sync::Mutex`, while unrelated orders proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct LockTable {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Holds an order (or courier) locked for the lifetime of the guard.
pub struct LockGuard<'a> {
    _inner: MutexGuard<'a, ()>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the logical lock for `key`, blocking other holders of the
    /// same key until the returned guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedLockGuard {
        let mutex = self.entry(key).await;
        let guard = mutex.clone().lock_owned().await;
        OwnedLockGuard { _guard: guard }
    }
}

/// Like [`LockGuard`] but without a borrow on the table, so it can be held
/// across an `.await` inside an async handler body.
pub struct OwnedLockGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn serializes_same_key() {
        let table = LockTable::new();
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _g = table.lock("order-1").await;
                let before = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(before + 1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }
}
