// raleighsl: object cache
// oid -> Object over the concurrent map; at most one live Object per oid.

use crate::object::Object;
use std::sync::Arc;
use zcl_collections::ChMap;

pub struct ObjectCache {
    map: ChMap<Object>,
}

impl ObjectCache {
    pub fn new(buckets: u32) -> Self {
        Self {
            map: ChMap::new(buckets),
        }
    }

    /// Insert the object unless its oid is already cached; returns the
    /// cached object and whether this call inserted it.
    pub fn insert(&self, object: Arc<Object>) -> (Arc<Object>, bool) {
        self.map.try_insert(object.oid, object)
    }

    pub fn lookup(&self, oid: u64) -> Option<Arc<Object>> {
        self.map.lookup(oid)
    }

    pub fn remove(&self, oid: u64) -> Option<Arc<Object>> {
        self.map.remove(oid)
    }

    pub fn len(&self) -> u32 {
        self.map.used()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
