//! Keyed session tables.
//!
//! The navigator and poll manager keep their per-user state behind
//! [`SessionStore`] so the state machines never touch a global map
//! directly. [`MemorySessionStore`] holds one mutex per key: updates for the
//! same key are serialized, updates for different keys never contend on
//! anything but the brief table lookup.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait SessionStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `value`, returning the session it replaced.
    fn put(&self, key: K, value: V) -> Option<V>;

    fn delete(&self, key: &K) -> Option<V>;

    /// Runs `f` on the session under `key` while holding that key's lock.
    /// Returns `None` when no session exists.
    fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R>;

    fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

type Slot<V> = Arc<Mutex<V>>;

pub struct MemorySessionStore<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for MemorySessionStore<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> MemorySessionStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &K) -> Option<Slot<V>> {
        lock(&self.slots).get(key).map(Arc::clone)
    }
}

impl<K, V> SessionStore<K, V> for MemorySessionStore<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let slot = self.slot(key)?;
        let value = lock(&slot).clone();
        Some(value)
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(&key) {
            // Replace in place so a writer already holding this slot stays ordered.
            let mut current = lock(slot);
            return Some(std::mem::replace(&mut *current, value));
        }
        slots.insert(key, Arc::new(Mutex::new(value)));
        None
    }

    fn delete(&self, key: &K) -> Option<V> {
        let slot = lock(&self.slots).remove(key)?;
        let value = lock(&slot).clone();
        Some(value)
    }

    fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let slot = self.slot(key)?;
        let mut value = lock(&slot);
        Some(f(&mut *value))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn put_get_delete_round() {
        let store: MemorySessionStore<i64, u32> = MemorySessionStore::new();
        assert!(store.get(&1).is_none());
        assert_eq!(store.put(1, 10), None);
        assert_eq!(store.put(1, 11), Some(10));
        assert_eq!(store.get(&1), Some(11));
        assert_eq!(store.delete(&1), Some(11));
        assert!(!store.contains(&1));
        assert!(store.is_empty());
    }

    #[test]
    fn update_missing_key_returns_none() {
        let store: MemorySessionStore<i64, u32> = MemorySessionStore::new();
        assert_eq!(store.update(&7, |value| *value += 1), None);
    }

    #[test]
    fn concurrent_updates_on_one_key_are_not_lost() {
        let store = Arc::new(MemorySessionStore::<i64, u64>::new());
        store.put(1, 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        store.update(&1, |value| *value += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&1), Some(4000));
    }
}
