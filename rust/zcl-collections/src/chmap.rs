// zcl-collections: concurrent oid map
// Single segment of power-of-two buckets; each bucket is a read/write
// locked list kept in ascending oid order. Entries are shared by Arc, which
// plays the role of the per-entry refcount: lookup clones, callers drop.

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Bucket<T> = CachePadded<RwLock<Vec<(u64, Arc<T>)>>>;

/// 64-bit avalanche mix spreading sequential oids across buckets.
#[inline]
fn hash64(mut v: u64) -> u64 {
    v ^= v >> 33;
    v = v.wrapping_mul(0xff51_afd7_ed55_8ccd);
    v ^= v >> 33;
    v = v.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    v ^= v >> 33;
    v
}

/// Concurrent map keyed by 64-bit object id.
pub struct ChMap<T> {
    buckets: Box<[Bucket<T>]>,
    mask: u64,
    used: AtomicU32,
}

impl<T> ChMap<T> {
    /// Create a map with at least `width` buckets (rounded up to a power of
    /// two, minimum 8).
    pub fn new(width: u32) -> Self {
        let width = width.max(8).next_power_of_two();
        Self {
            buckets: (0..width)
                .map(|_| CachePadded::new(RwLock::new(Vec::new())))
                .collect(),
            mask: u64::from(width) - 1,
            used: AtomicU32::new(0),
        }
    }

    #[inline]
    fn bucket(&self, oid: u64) -> &Bucket<T> {
        &self.buckets[(hash64(oid) & self.mask) as usize]
    }

    /// Number of linked entries.
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Acquire)
    }

    /// Insert `entry` under `oid` unless an entry already exists. Returns
    /// the entry now present in the map and whether this call inserted it.
    pub fn try_insert(&self, oid: u64, entry: Arc<T>) -> (Arc<T>, bool) {
        let mut chain = self.bucket(oid).write();
        match chain.binary_search_by_key(&oid, |(id, _)| *id) {
            Ok(at) => (Arc::clone(&chain[at].1), false),
            Err(at) => {
                chain.insert(at, (oid, Arc::clone(&entry)));
                self.used.fetch_add(1, Ordering::AcqRel);
                (entry, true)
            }
        }
    }

    /// Shared lookup; the returned handle keeps the entry alive even if it
    /// is removed from the map afterwards.
    pub fn lookup(&self, oid: u64) -> Option<Arc<T>> {
        let chain = self.bucket(oid).read();
        chain
            .binary_search_by_key(&oid, |(id, _)| *id)
            .ok()
            .map(|at| Arc::clone(&chain[at].1))
    }

    /// Unlink and return the entry for `oid`, if present.
    pub fn remove(&self, oid: u64) -> Option<Arc<T>> {
        let mut chain = self.bucket(oid).write();
        let at = chain.binary_search_by_key(&oid, |(id, _)| *id).ok()?;
        let (_, entry) = chain.remove(at);
        self.used.fetch_sub(1, Ordering::AcqRel);
        Some(entry)
    }

    /// Snapshot of every (oid, entry) pair, bucket by bucket.
    pub fn entries(&self) -> Vec<(u64, Arc<T>)> {
        let mut out = Vec::with_capacity(self.used() as usize);
        for bucket in self.buckets.iter() {
            let chain = bucket.read();
            out.extend(chain.iter().map(|(id, e)| (*id, Arc::clone(e))));
        }
        out
    }
}
