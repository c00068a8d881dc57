use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle slots are swept once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 4096;

/// One async mutex per key, created on first use.
///
/// The guards are owned, so they can be held across `.await` points and moved
/// between helpers. Acquiring several keys goes through [`KeyedLocks::lock_many`],
/// which sorts them first so two callers never wait on each other in opposite
/// order.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Ord,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        if self.slots.len() > PRUNE_THRESHOLD {
            self.prune();
        }
        let slot = self.slots.entry(key.clone()).or_default().clone();
        slot.lock_owned().await
    }

    /// Locks every distinct key in ascending order.
    pub async fn lock_many(&self, keys: &[K]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered: Vec<&K> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Drops slots nobody is holding or waiting on.
    pub fn prune(&self) {
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let guard = locks.lock(&1).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<u32>::new();
        let _a = locks.lock(&1).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&2))
            .await
            .expect("independent key should not wait");
    }

    #[tokio::test]
    async fn lock_many_dedups_and_prune_sweeps_idle_slots() {
        let locks = KeyedLocks::<u32>::new();
        {
            let guards = locks.lock_many(&[3, 1, 3]).await;
            assert_eq!(guards.len(), 2);
        }
        assert_eq!(locks.len(), 2);
        locks.prune();
        assert!(locks.is_empty());
    }
}
