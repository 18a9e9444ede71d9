// zcl-collections: skiplist
// Randomised-level sorted list (p = 1/4, max height 12), arena-backed.
// Mutations are journaled; commit() forgets the journal, rollback() replays
// it in reverse to restore the pre-transaction content.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

pub const MAX_HEIGHT: usize = 12;
const NIL: u32 = u32::MAX;

struct SkipNode<T> {
    data: Option<T>,
    next: Vec<u32>,
}

enum Undo<T> {
    /// A fresh item was inserted; rollback removes it.
    Inserted(T),
    /// An existing item was replaced; rollback puts the old one back.
    Replaced(T),
    /// An item was removed; rollback re-inserts it.
    Removed(T),
}

/// Sorted list with journaled mutations.
///
/// `T: Clone` because the journal keeps pre-images; entries are expected to
/// be small (the flat semantic stores 40-byte name entries).
pub struct SkipList<T: Ord + Clone> {
    nodes: Vec<SkipNode<T>>,
    free: Vec<u32>,
    head: [u32; MAX_HEIGHT],
    levels: usize,
    len: usize,
    rng: SmallRng,
    journal: Vec<Undo<T>>,
}

impl<T: Ord + Clone> SkipList<T> {
    pub fn new() -> Self {
        Self::with_seed(0x7bcb_4948)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: [NIL; MAX_HEIGHT],
            levels: 1,
            len: 0,
            rng: SmallRng::seed_from_u64(seed),
            journal: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn rand_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_HEIGHT && self.rng.gen_range(0..4u8) == 0 {
            level += 1;
        }
        level
    }

    #[inline]
    fn data(&self, idx: u32) -> &T {
        self.nodes[idx as usize].data.as_ref().expect("live node")
    }

    fn alloc(&mut self, data: T, level: usize) -> u32 {
        let node = SkipNode {
            data: Some(data),
            next: vec![NIL; level],
        };
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = node;
            idx
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    /// Successors at every level for the smallest entry >= the probe, where
    /// `cmp(entry)` orders entries against the probe.
    fn find_prev<F>(&self, cmp: &F, prev: &mut [u32; MAX_HEIGHT]) -> u32
    where
        F: Fn(&T) -> Ordering,
    {
        let mut from_head = true;
        let mut at = NIL;
        for level in (0..self.levels).rev() {
            let mut next = if from_head {
                self.head[level]
            } else {
                self.nodes[at as usize].next[level]
            };
            while next != NIL && cmp(self.data(next)) == Ordering::Less {
                at = next;
                from_head = false;
                next = self.nodes[at as usize].next[level];
            }
            prev[level] = at;
        }
        if from_head {
            self.head[0]
        } else {
            self.nodes[at as usize].next[0]
        }
    }

    #[inline]
    fn next_of(&self, prev: u32, level: usize) -> u32 {
        if prev == NIL {
            self.head[level]
        } else {
            self.nodes[prev as usize].next[level]
        }
    }

    #[inline]
    fn set_next(&mut self, prev: u32, level: usize, to: u32) {
        if prev == NIL {
            self.head[level] = to;
        } else {
            self.nodes[prev as usize].next[level] = to;
        }
    }

    /// Insert `item`; an equal entry is replaced and returned.
    pub fn put(&mut self, item: T) -> Option<T> {
        let mut prev = [NIL; MAX_HEIGHT];
        let candidate = {
            let probe = &item;
            self.find_prev(&|e: &T| e.cmp(probe), &mut prev)
        };
        if candidate != NIL && self.data(candidate).cmp(&item) == Ordering::Equal {
            let old = self.nodes[candidate as usize]
                .data
                .replace(item)
                .expect("live node");
            self.journal.push(Undo::Replaced(old.clone()));
            return Some(old);
        }
        let level = self.rand_level();
        if level > self.levels {
            self.levels = level;
        }
        self.journal.push(Undo::Inserted(item.clone()));
        let idx = self.alloc(item, level);
        for l in 0..level {
            let succ = self.next_of(prev[l], l);
            self.nodes[idx as usize].next[l] = succ;
            self.set_next(prev[l], l, idx);
        }
        self.len += 1;
        None
    }

    /// Remove the entry matching the probe ordering, returning it.
    pub fn remove_by<F>(&mut self, cmp: F) -> Option<T>
    where
        F: Fn(&T) -> Ordering,
    {
        let mut prev = [NIL; MAX_HEIGHT];
        let target = self.find_prev(&cmp, &mut prev);
        if target == NIL || cmp(self.data(target)) != Ordering::Equal {
            return None;
        }
        for l in 0..self.levels {
            if self.next_of(prev[l], l) == target {
                let after = self.nodes[target as usize].next[l];
                self.set_next(prev[l], l, after);
            }
        }
        while self.levels > 1 && self.head[self.levels - 1] == NIL {
            self.levels -= 1;
        }
        let data = self.nodes[target as usize].data.take().expect("live node");
        self.free.push(target);
        self.len -= 1;
        self.journal.push(Undo::Removed(data.clone()));
        Some(data)
    }

    pub fn remove(&mut self, item: &T) -> Option<T> {
        self.remove_by(|e| e.cmp(item))
    }

    pub fn get_by<F>(&self, cmp: F) -> Option<&T>
    where
        F: Fn(&T) -> Ordering,
    {
        let mut prev = [NIL; MAX_HEIGHT];
        let candidate = self.find_prev(&cmp, &mut prev);
        if candidate != NIL && cmp(self.data(candidate)) == Ordering::Equal {
            Some(self.data(candidate))
        } else {
            None
        }
    }

    pub fn get(&self, item: &T) -> Option<&T> {
        self.get_by(|e| e.cmp(item))
    }

    pub fn min(&self) -> Option<&T> {
        (self.head[0] != NIL).then(|| self.data(self.head[0]))
    }

    pub fn max(&self) -> Option<&T> {
        let mut from_head = true;
        let mut at = NIL;
        for level in (0..self.levels).rev() {
            loop {
                let next = if from_head {
                    self.head[level]
                } else {
                    self.nodes[at as usize].next[level]
                };
                if next == NIL {
                    break;
                }
                at = next;
                from_head = false;
            }
        }
        (!from_head).then(|| self.data(at))
    }

    /// In-order iterator over the level-0 chain.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut at = self.head[0];
        std::iter::from_fn(move || {
            if at == NIL {
                return None;
            }
            let item = self.data(at);
            at = self.nodes[at as usize].next[0];
            Some(item)
        })
    }

    /// Forget the journal: every mutation since the last commit/rollback
    /// becomes permanent.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Undo every journaled mutation, newest first.
    pub fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Inserted(item) => {
                    self.remove(&item);
                }
                Undo::Replaced(old) | Undo::Removed(old) => {
                    self.put(old);
                }
            }
        }
        self.journal.clear();
    }
}

impl<T: Ord + Clone> Default for SkipList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove_sorted() {
        let mut list = SkipList::new();
        for v in [30u64, 10, 50, 20, 40] {
            assert_eq!(list.put(v), None);
        }
        list.commit();
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(&20), Some(&20));
        assert_eq!(list.min(), Some(&10));
        assert_eq!(list.max(), Some(&50));
        let ordered: Vec<u64> = list.iter().copied().collect();
        assert_eq!(ordered, vec![10, 20, 30, 40, 50]);
        assert_eq!(list.remove(&30), Some(30));
        assert_eq!(list.get(&30), None);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_rollback_restores_content() {
        let mut list = SkipList::new();
        for v in [1u64, 2, 3] {
            list.put(v);
        }
        list.commit();

        list.put(4);
        list.remove(&2);
        list.put(1); // replace
        list.rollback();

        let ordered: Vec<u64> = list.iter().copied().collect();
        assert_eq!(ordered, vec![1, 2, 3]);
    }

    #[test]
    fn test_commit_is_permanent() {
        let mut list = SkipList::new();
        list.put(7u64);
        list.commit();
        list.rollback();
        assert_eq!(list.get(&7), Some(&7));
    }

    #[test]
    fn test_large_population_stays_sorted() {
        let mut list = SkipList::new();
        let mut values: Vec<u64> = (0..2000).map(|i| (i * 2654435761u64) % 100_000).collect();
        for &v in &values {
            list.put(v);
        }
        list.commit();
        values.sort_unstable();
        values.dedup();
        let got: Vec<u64> = list.iter().copied().collect();
        assert_eq!(got, values);
    }
}
