use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Index;

use ahash::RandomState;
use indexmap::IndexMap;

/// An [`IndexMap`] whose entry positions are exposed as the typed index `I`.
pub struct TiMap<I, K, V> {
    entries: IndexMap<K, V, RandomState>,
    _idx: PhantomData<fn(I) -> I>,
}

impl<I, K, V> Default for TiMap<I, K, V> {
    fn default() -> Self {
        TiMap { entries: IndexMap::default(), _idx: PhantomData }
    }
}

impl<I, K: Clone, V: Clone> Clone for TiMap<I, K, V> {
    fn clone(&self) -> Self {
        TiMap { entries: self.entries.clone(), _idx: PhantomData }
    }
}

impl<I: From<usize> + fmt::Debug, K: fmt::Debug, V: fmt::Debug> fmt::Debug for TiMap<I, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_enumerated()).finish()
    }
}

impl<I: From<usize>, K, V> TiMap<I, K, V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order together with their index.
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, (&K, &V))> + '_ {
        self.entries.iter().enumerate().map(|(idx, entry)| (I::from(idx), entry))
    }
}

impl<I: From<usize>, K: Hash + Eq, V> TiMap<I, K, V> {
    /// Inserts (or overwrites) the entry of `key`. Returns its index and the value it replaced.
    pub fn insert_full(&mut self, key: K, val: V) -> (I, Option<V>) {
        let (idx, prev) = self.entries.insert_full(key, val);
        (I::from(idx), prev)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn index_of(&self, key: &K) -> Option<I> {
        self.entries.get_index_of(key).map(I::from)
    }
}

impl<I: Into<usize>, K, V> Index<I> for TiMap<I, K, V> {
    type Output = V;

    fn index(&self, idx: I) -> &V {
        &self.entries[idx.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::TiMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Slot(usize);

    impl From<usize> for Slot {
        fn from(raw: usize) -> Slot {
            Slot(raw)
        }
    }

    impl From<Slot> for usize {
        fn from(slot: Slot) -> usize {
            slot.0
        }
    }

    #[test]
    fn indices_are_stable() {
        let mut map: TiMap<Slot, &str, u32> = TiMap::default();
        assert!(map.is_empty());
        assert_eq!(map.insert_full("x", 1), (Slot(0), None));
        assert_eq!(map.insert_full("y", 2), (Slot(1), None));
        assert_eq!(map.insert_full("x", 3), (Slot(0), Some(1)));
        assert_eq!(map.index_of(&"y"), Some(Slot(1)));
        assert_eq!(map.index_of(&"z"), None);
        assert_eq!(map.get(&"x"), Some(&3));
        assert_eq!(map[Slot(1)], 2);
        assert_eq!(map.len(), 2);
        let keys: Vec<_> = map.iter_enumerated().map(|(slot, (&key, _))| (slot, key)).collect();
        assert_eq!(keys, vec![(Slot(0), "x"), (Slot(1), "y")]);
    }
}
