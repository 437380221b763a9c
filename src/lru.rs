//! A generic, byte-accounted LRU container (C1) and the `Cache` trait it
//! implements, so that [`crate::safe_cache::SafeCache`] (C2) can wrap any
//! conforming implementation.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Capability required of every value stored in a cache: it must be able to
/// report its own accounting cost. A PDF reports its byte length; a cheap
/// memoized record can report a constant `1`.
pub trait Cacheable {
    fn size(&self) -> u64;
}

/// Callback fired once per removal caused by `add` (replace or overflow),
/// `remove`, `remove_oldest`, shrinking `resize`, and `purge`. Runs
/// synchronously under whatever lock the caller holds — it must not call
/// back into the cache that invoked it.
pub type EvictionCallback<K, V> = Box<dyn FnMut(&K, &V) + Send + Sync>;

/// The contract a cache must satisfy to be wrapped by [`crate::safe_cache::SafeCache`].
///
/// `get`/`peek` return owned clones rather than references so that a
/// synchronized wrapper can release its lock as soon as the call returns.
pub trait Cache<K, V> {
    fn add(&mut self, key: K, value: V);
    fn get(&mut self, key: &K) -> Option<V>;
    fn peek(&self, key: &K) -> Option<V>;
    fn touch(&mut self, key: &K);
    fn contains(&self, key: &K) -> bool;
    fn keys(&self) -> Vec<K>;
    fn remove(&mut self, key: &K);
    fn remove_oldest(&mut self);
    fn purge(&mut self);
    fn capacity(&self) -> u64;
    fn size(&self) -> u64;
    fn len(&self) -> usize;
    fn resize(&mut self, capacity: u64);
}

struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bounded ordered mapping, safe-Rust equivalent of an intrusive doubly
/// linked list: nodes live in a slab (`Vec<Option<Slot<_>>>`) addressed by
/// index, so the list itself never needs raw pointers.
pub struct LruCache<K, V> {
    capacity: u64,
    used: u64,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
    on_eviction: Option<EvictionCallback<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Cacheable + Clone,
{
    /// `capacity` of zero disables eviction entirely. A negative capacity is
    /// rejected with [`Error::InvalidCapacity`].
    pub fn new(capacity: i64, on_eviction: Option<EvictionCallback<K, V>>) -> Result<Self> {
        if capacity < 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity: capacity as u64,
            used: 0,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            newest: None,
            oldest: None,
            on_eviction,
        })
    }

    fn alloc(&mut self, slot: Slot<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn link_newest(&mut self, idx: usize) {
        let prev_newest = self.newest;
        if let Some(slot) = &mut self.slots[idx] {
            slot.prev = prev_newest;
            slot.next = None;
        }
        if let Some(prev_idx) = prev_newest {
            if let Some(slot) = &mut self.slots[prev_idx] {
                slot.next = Some(idx);
            }
        }
        self.newest = Some(idx);
        if self.oldest.is_none() {
            self.oldest = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slots[idx] {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(slot) = &mut self.slots[p] {
                    slot.next = next;
                }
            }
            None => self.oldest = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = &mut self.slots[n] {
                    slot.prev = prev;
                }
            }
            None => self.newest = prev,
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.newest == Some(idx) {
            return;
        }
        self.unlink(idx);
        if let Some(slot) = &mut self.slots[idx] {
            slot.prev = None;
            slot.next = None;
        }
        self.link_newest(idx);
    }

    fn evict_slot(&mut self, idx: usize) {
        self.unlink(idx);
        let slot = self.slots[idx].take().expect("evicted index must hold a slot");
        self.index.remove(&slot.key);
        self.used = self.used.saturating_sub(slot.value.size());
        self.free.push(idx);
        if let Some(cb) = &mut self.on_eviction {
            cb(&slot.key, &slot.value);
        }
    }

    fn check_size(&mut self) {
        while self.capacity != 0 && self.used > self.capacity {
            self.remove_oldest();
        }
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Cacheable + Clone,
{
    fn add(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            self.evict_slot(idx);
        }
        self.used += value.size();
        let idx = self.alloc(Slot {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.link_newest(idx);
        self.index.insert(key, idx);
        self.check_size();
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slots[idx].as_ref().map(|slot| slot.value.clone())
    }

    fn peek(&self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|slot| slot.value.clone())
    }

    fn touch(&mut self, key: &K) {
        if let Some(&idx) = self.index.get(key) {
            self.promote(idx);
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cur = self.oldest;
        while let Some(idx) = cur {
            let slot = self.slots[idx].as_ref().expect("linked index must hold a slot");
            keys.push(slot.key.clone());
            cur = slot.next;
        }
        keys
    }

    fn remove(&mut self, key: &K) {
        if let Some(&idx) = self.index.get(key) {
            self.evict_slot(idx);
        }
    }

    fn remove_oldest(&mut self) {
        if let Some(idx) = self.oldest {
            self.evict_slot(idx);
        }
    }

    fn purge(&mut self) {
        for key in self.keys() {
            self.remove(&key);
        }
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn size(&self) -> u64 {
        self.used
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn resize(&mut self, capacity: u64) {
        if capacity >= self.capacity {
            self.capacity = capacity;
            return;
        }
        self.capacity = capacity;
        self.check_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Unit(i64);

    impl Cacheable for Unit {
        fn size(&self) -> u64 {
            1
        }
    }

    #[test]
    fn negative_capacity_is_rejected() {
        let result = LruCache::<i32, Unit>::new(-1, None);
        assert!(matches!(result, Err(Error::InvalidCapacity(-1))));
    }

    #[test]
    fn add_and_get_roundtrip() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(10));
        c.add(2, Unit(20));
        assert_eq!(c.get(&1), Some(Unit(10)));
        assert_eq!(c.len(), 2);
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn get_promotes_to_newest() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(2));
        c.add(3, Unit(3));
        c.get(&1);
        assert_eq!(c.keys(), vec![2, 3, 1]);
    }

    #[test]
    fn touch_promotes_without_returning() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(2));
        c.touch(&1);
        assert_eq!(c.keys(), vec![2, 1]);
    }

    #[test]
    fn peek_does_not_change_recency() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(2));
        assert_eq!(c.peek(&1), Some(Unit(1)));
        assert_eq!(c.keys(), vec![1, 2]);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let evicted = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let evicted_cb = evicted.clone();
        let cb: EvictionCallback<i32, Unit> = Box::new(move |k, _v| evicted_cb.lock().unwrap().push(*k));
        let mut c = LruCache::<i32, Unit>::new(2, Some(cb)).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(1));
        c.add(3, Unit(1));
        assert_eq!(c.len(), 2);
        assert_eq!(c.keys(), vec![2, 3]);
        assert_eq!(*evicted.lock().unwrap(), vec![1]);
    }

    #[test]
    fn replace_fires_eviction_once() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_cb = count.clone();
        let cb: EvictionCallback<i32, Unit> =
            Box::new(move |_k, _v| { count_cb.fetch_add(1, std::sync::atomic::Ordering::SeqCst); });
        let mut c = LruCache::<i32, Unit>::new(0, Some(cb)).unwrap();
        c.add(1, Unit(1));
        c.add(1, Unit(2));
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(c.peek(&1), Some(Unit(2)));
        assert_eq!(c.size(), 1);
    }

    #[test]
    fn remove_clamps_used_non_negative() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(1));
        c.remove(&1);
        c.remove(&1);
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn purge_evicts_oldest_to_newest() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_cb = order.clone();
        let cb: EvictionCallback<i32, Unit> = Box::new(move |k, _v| order_cb.lock().unwrap().push(*k));
        let mut c = LruCache::<i32, Unit>::new(0, Some(cb)).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(1));
        c.add(3, Unit(1));
        c.purge();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn resize_grow_evicts_nothing() {
        let mut c = LruCache::<i32, Unit>::new(2, None).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(1));
        c.resize(10);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn resize_shrink_evicts_oldest_first() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        c.add(1, Unit(1));
        c.add(2, Unit(1));
        c.add(3, Unit(1));
        c.resize(1);
        assert_eq!(c.keys(), vec![3]);
        assert_eq!(c.size(), 1);
    }

    #[test]
    fn zero_capacity_never_evicts() {
        let mut c = LruCache::<i32, Unit>::new(0, None).unwrap();
        for i in 0..1000 {
            c.add(i, Unit(1));
        }
        assert_eq!(c.len(), 1000);
    }
}
