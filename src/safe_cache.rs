//! Thread-safe wrapper (C2) around any [`Cache`] implementation. Read-only
//! operations take a read lock; anything that can change recency or content
//! takes the write lock (`get` included, since it promotes the touched
//! entry).

use std::sync::RwLock;

use crate::lru::Cache;

pub struct SafeCache<K, V> {
    inner: RwLock<Box<dyn Cache<K, V> + Send + Sync>>,
}

impl<K, V> SafeCache<K, V> {
    pub fn new(cache: Box<dyn Cache<K, V> + Send + Sync>) -> Self {
        Self {
            inner: RwLock::new(cache),
        }
    }

    pub fn add(&self, key: K, value: V) {
        self.inner.write().unwrap().add(key, value);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.write().unwrap().get(key)
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.read().unwrap().peek(key)
    }

    pub fn touch(&self, key: &K) {
        self.inner.write().unwrap().touch(key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().unwrap().contains(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.read().unwrap().keys()
    }

    pub fn remove(&self, key: &K) {
        self.inner.write().unwrap().remove(key);
    }

    pub fn remove_oldest(&self) {
        self.inner.write().unwrap().remove_oldest();
    }

    pub fn purge(&self) {
        self.inner.write().unwrap().purge();
    }

    pub fn capacity(&self) -> u64 {
        self.inner.read().unwrap().capacity()
    }

    pub fn size(&self) -> u64 {
        self.inner.read().unwrap().size()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resize(&self, capacity: u64) {
        self.inner.write().unwrap().resize(capacity);
    }
}
