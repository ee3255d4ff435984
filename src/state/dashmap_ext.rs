use dashmap::DashMap;
use std::hash::Hash;

/// Snapshot helpers for `DashMap` that release shard locks before returning.
///
/// Fan-out writes to many connections; none of that may happen while a
/// shard guard is alive, or a registration on the same shard would stall
/// behind it (and a removal from inside the loop would deadlock).
pub trait DashMapExt<K, V> {
    /// Clone every value.
    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone;

    /// Key of the first entry whose value matches `pred`.
    fn find_key<F>(&self, pred: F) -> Option<K>
    where
        K: Clone,
        F: FnMut(&V) -> bool;
}

impl<K, V> DashMapExt<K, V> for DashMap<K, V>
where
    K: Eq + Hash,
{
    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|e| e.value().clone()).collect()
    }

    fn find_key<F>(&self, mut pred: F) -> Option<K>
    where
        K: Clone,
        F: FnMut(&V) -> bool,
    {
        self.iter()
            .find(|e| pred(e.value()))
            .map(|e| e.key().clone())
    }
}
