use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// Outcome of [`UniqueIndex::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation<V> {
    /// The key was free and now maps to the given value.
    Reserved,
    /// The key is already held; carries the current owner.
    Taken(V),
}

impl<V> Reservation<V> {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved)
    }
}

/// Storage-level uniqueness constraint: each key maps to at most one value.
///
/// `reserve` is an insert-if-absent under the write lock, so of two racing callers exactly
/// one wins. Used for invitation codes, external payment references and retry claims.
#[derive(Debug)]
pub struct UniqueIndex<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for UniqueIndex<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> UniqueIndex<K, V>
where
    K: Eq + Hash,
    V: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, key: K, value: V) -> Reservation<V> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&key) {
            Some(owner) => Reservation::Taken(owner.clone()),
            None => {
                entries.insert(key, value);
                Reservation::Reserved
            }
        }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Release `key` only while it still maps to `value`. Returns whether it was released.
    pub fn release(&self, key: &K, value: &V) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key) == Some(value) {
            entries.remove(key);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
