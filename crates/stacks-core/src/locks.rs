//! Keyed async mutexes serializing circulation work per title and per copy.
//!
//! Keys are always acquired in sorted order (every title key sorts before
//! every copy key), and each acquisition is bounded by a timeout that
//! surfaces [`Error::Busy`] instead of waiting forever.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
  Title(Uuid),
  Copy(Uuid),
}

type Slot = Arc<tokio::sync::Mutex<()>>;

struct Inner {
  slots:   Mutex<HashMap<LockKey, Slot>>,
  timeout: Duration,
}

impl Inner {
  fn slot(&self, key: LockKey) -> Slot {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots.entry(key).or_default().clone()
  }

  /// Drop slots nobody holds or waits on.
  fn prune(&self, keys: &[LockKey]) {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
      if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
        slots.remove(key);
      }
    }
  }
}

/// A registry of per-key mutexes. Cloning shares the registry.
#[derive(Clone)]
pub struct KeyedLocks {
  inner: Arc<Inner>,
}

/// Guards for a set of keys; released together on drop.
pub struct LockSet {
  guards: Vec<OwnedMutexGuard<()>>,
  keys:   Vec<LockKey>,
  inner:  Arc<Inner>,
}

impl KeyedLocks {
  pub fn new(timeout: Duration) -> Self {
    Self {
      inner: Arc::new(Inner { slots: Mutex::new(HashMap::new()), timeout }),
    }
  }

  pub async fn lock(&self, mut keys: Vec<LockKey>) -> Result<LockSet> {
    keys.sort_unstable();
    keys.dedup();

    let mut set = LockSet {
      guards: Vec::with_capacity(keys.len()),
      keys:   Vec::new(),
      inner:  self.inner.clone(),
    };
    for key in keys {
      let slot = self.inner.slot(key);
      set.keys.push(key);
      match tokio::time::timeout(self.inner.timeout, slot.lock_owned()).await {
        Ok(guard) => set.guards.push(guard),
        Err(_) => {
          tracing::warn!(?key, timeout = ?self.inner.timeout, "lock acquisition timed out");
          return Err(Error::Busy(format!("{key:?} is locked by another operation")));
        }
      }
    }
    Ok(set)
  }

  /// Number of keys currently tracked.
  pub fn tracked(&self) -> usize {
    self
      .inner
      .slots
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }
}

impl Drop for LockSet {
  fn drop(&mut self) {
    self.guards.clear();
    self.inner.prune(&self.keys);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn contention_times_out_as_busy() {
    let locks = KeyedLocks::new(Duration::from_millis(20));
    let title = Uuid::new_v4();

    let held = locks.lock(vec![LockKey::Title(title)]).await.unwrap();
    let err = locks.lock(vec![LockKey::Title(title)]).await.err().unwrap();
    assert!(matches!(err, Error::Busy(_)));

    drop(held);
    assert!(locks.lock(vec![LockKey::Title(title)]).await.is_ok());
  }

  #[tokio::test]
  async fn distinct_keys_do_not_contend() {
    let locks = KeyedLocks::new(Duration::from_millis(20));
    let _a = locks.lock(vec![LockKey::Copy(Uuid::new_v4())]).await.unwrap();
    let _b = locks.lock(vec![LockKey::Copy(Uuid::new_v4())]).await.unwrap();
  }

  #[tokio::test]
  async fn slots_pruned_after_release() {
    let locks = KeyedLocks::new(Duration::from_millis(20));
    let set = locks
      .lock(vec![LockKey::Copy(Uuid::new_v4()), LockKey::Title(Uuid::new_v4())])
      .await
      .unwrap();
    assert_eq!(locks.tracked(), 2);
    drop(set);
    assert_eq!(locks.tracked(), 0);
  }

  #[test]
  fn titles_sort_before_copies() {
    let mut keys = vec![LockKey::Copy(Uuid::nil()), LockKey::Title(Uuid::from_u128(u128::MAX))];
    keys.sort();
    assert!(matches!(keys[0], LockKey::Title(_)));
  }
}
