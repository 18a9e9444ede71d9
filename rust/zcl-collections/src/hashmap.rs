// zcl-collections: open-addressing hash map
// Linear probing over a power-of-two table with tombstones. Grows at 3/4
// load, counting tombstones.

use ahash::RandomState;
use std::hash::{BuildHasher, Hash};

enum Slot<K, V> {
    Empty,
    Tombstone,
    Occupied(K, V),
}

/// Open-addressing hash map with linear probing.
pub struct OpenHashMap<K, V> {
    slots: Vec<Slot<K, V>>,
    mask: usize,
    used: usize,
    tombstones: usize,
    hasher: RandomState,
}

impl<K: Hash + Eq, V> OpenHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = capacity.max(8).next_power_of_two();
        Self {
            slots: (0..cap).map(|_| Slot::Empty).collect(),
            mask: cap - 1,
            used: 0,
            tombstones: 0,
            hasher: RandomState::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    fn index_of(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) & self.mask
    }

    fn find(&self, key: &K) -> Option<usize> {
        let mut at = self.index_of(key);
        loop {
            match &self.slots[at] {
                Slot::Empty => return None,
                Slot::Occupied(k, _) if k == key => return Some(at),
                _ => at = (at + 1) & self.mask,
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|at| match &self.slots[at] {
            Slot::Occupied(_, v) => v,
            _ => unreachable!(),
        })
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let at = self.find(key)?;
        match &mut self.slots[at] {
            Slot::Occupied(_, v) => Some(v),
            _ => unreachable!(),
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Insert, returning the previous value for the key if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if (self.used + self.tombstones + 1) * 4 > self.slots.len() * 3 {
            self.grow();
        }
        enum Probe {
            Replace(usize),
            InsertAt(usize),
        }
        let probe = {
            let mut at = self.index_of(&key);
            let mut first_tombstone = None;
            loop {
                match &self.slots[at] {
                    Slot::Empty => break Probe::InsertAt(first_tombstone.unwrap_or(at)),
                    Slot::Occupied(k, _) if k == &key => break Probe::Replace(at),
                    Slot::Occupied(..) => at = (at + 1) & self.mask,
                    Slot::Tombstone => {
                        if first_tombstone.is_none() {
                            first_tombstone = Some(at);
                        }
                        at = (at + 1) & self.mask;
                    }
                }
            }
        };
        match probe {
            Probe::Replace(at) => match &mut self.slots[at] {
                Slot::Occupied(_, v) => Some(std::mem::replace(v, value)),
                _ => unreachable!(),
            },
            Probe::InsertAt(target) => {
                if matches!(self.slots[target], Slot::Tombstone) {
                    self.tombstones -= 1;
                }
                self.slots[target] = Slot::Occupied(key, value);
                self.used += 1;
                None
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let at = self.find(key)?;
        let slot = std::mem::replace(&mut self.slots[at], Slot::Tombstone);
        self.used -= 1;
        self.tombstones += 1;
        match slot {
            Slot::Occupied(_, v) => Some(v),
            _ => unreachable!(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Occupied(k, v) => Some((k, v)),
            _ => None,
        })
    }

    /// Drain every entry, leaving the map empty.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.tombstones = 0;
        self.used = 0;
        self.slots
            .iter_mut()
            .filter_map(|s| match std::mem::replace(s, Slot::Empty) {
                Slot::Occupied(k, v) => Some((k, v)),
                _ => None,
            })
            .collect()
    }

    fn grow(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old: Vec<Slot<K, V>> = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| Slot::Empty).collect(),
        );
        self.mask = new_cap - 1;
        self.used = 0;
        self.tombstones = 0;
        for slot in old {
            if let Slot::Occupied(k, v) = slot {
                self.insert(k, v);
            }
        }
    }
}

impl<K: Hash + Eq, V> Default for OpenHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
