use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// String-keyed memo owned by a client. Entries live as long as the cache
/// does; nothing is ever evicted or refreshed.
///
/// The lock is only held for the map operation itself. Two threads missing
/// on the same key will both compute the value and the last insert wins.
#[derive(Debug)]
pub struct Cache<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Cache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Return the cached value for `key`, or compute, store and return it.
    /// Errors from `compute` are passed through and nothing is stored.
    pub fn get_or_try_insert<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
