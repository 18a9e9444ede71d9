// raleighsl: flat semantic
// Names hash to 32-byte keys; (key -> oid) entries live in a skiplist
// ordered by key. The skiplist journal backs commit/rollback.

use crate::error::{StoreError, StoreResult};
use crate::plugins::{PlugInfo, PlugKind, SemanticPlugin};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use uuid::Uuid;
use zcl_collections::SkipList;

pub const FLAT_SEMANTIC_UUID: Uuid = Uuid::from_bytes([
    0x1b, 0x2f, 0x8d, 0x4c, 0x5e, 0x01, 0x4a, 0x9b, 0x8c, 0x33, 0x60, 0x17, 0xa4, 0xb0, 0x52,
    0xe1,
]);

#[derive(Clone)]
struct SemanticEntry {
    key: [u8; 32],
    oid: u64,
}

impl PartialEq for SemanticEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SemanticEntry {}

impl PartialOrd for SemanticEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

fn name_key(name: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(name);
    digest.into()
}

/// The default name -> oid mapper.
pub struct FlatSemantic {
    info: PlugInfo,
    table: Mutex<SkipList<SemanticEntry>>,
}

impl FlatSemantic {
    pub fn new() -> Self {
        Self {
            info: PlugInfo {
                uuid: FLAT_SEMANTIC_UUID,
                label: "semantic-flat",
                description: "Flat Semantic",
                kind: PlugKind::Semantic,
            },
            table: Mutex::new(SkipList::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FlatSemantic {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticPlugin for FlatSemantic {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn commit(&self) -> StoreResult<()> {
        self.table.lock().commit();
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        self.table.lock().rollback();
        Ok(())
    }

    fn create(&self, name: &[u8], oid: u64) -> StoreResult<()> {
        let key = name_key(name);
        let mut table = self.table.lock();
        if table.get_by(|e| e.key.cmp(&key)).is_some() {
            return Err(StoreError::AlreadyExists);
        }
        table.put(SemanticEntry { key, oid });
        Ok(())
    }

    fn lookup(&self, name: &[u8]) -> StoreResult<u64> {
        let key = name_key(name);
        self.table
            .lock()
            .get_by(|e| e.key.cmp(&key))
            .map(|e| e.oid)
            .ok_or(StoreError::NotFound)
    }

    fn unlink(&self, name: &[u8]) -> StoreResult<u64> {
        let key = name_key(name);
        self.table
            .lock()
            .remove_by(|e| e.key.cmp(&key))
            .map(|e| e.oid)
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_lookup_unlink() {
        let semantic = FlatSemantic::new();
        semantic.create(b"hits", 10).unwrap();
        semantic.create(b"misses", 11).unwrap();
        semantic.commit().unwrap();
        assert_eq!(semantic.lookup(b"hits").unwrap(), 10);
        assert_eq!(semantic.lookup(b"misses").unwrap(), 11);
        assert_eq!(semantic.lookup(b"absent"), Err(StoreError::NotFound));
        assert_eq!(semantic.unlink(b"hits").unwrap(), 10);
        assert_eq!(semantic.lookup(b"hits"), Err(StoreError::NotFound));
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let semantic = FlatSemantic::new();
        semantic.create(b"c", 1).unwrap();
        assert_eq!(semantic.create(b"c", 2), Err(StoreError::AlreadyExists));
        // the original binding is untouched
        assert_eq!(semantic.lookup(b"c").unwrap(), 1);
    }

    #[test]
    fn test_rollback_undoes_naming() {
        let semantic = FlatSemantic::new();
        semantic.create(b"stable", 1).unwrap();
        semantic.commit().unwrap();

        semantic.create(b"temp", 2).unwrap();
        semantic.unlink(b"stable").unwrap();
        semantic.rollback().unwrap();

        assert_eq!(semantic.lookup(b"stable").unwrap(), 1);
        assert_eq!(semantic.lookup(b"temp"), Err(StoreError::NotFound));
    }

    #[test]
    fn test_lookup_succeeds_iff_entry_exists() {
        // a name resolves iff its sha256 entry exists
        let semantic = FlatSemantic::new();
        for i in 0..100u64 {
            semantic.create(format!("obj-{i}").as_bytes(), i).unwrap();
        }
        semantic.commit().unwrap();
        for i in 0..100u64 {
            assert_eq!(semantic.lookup(format!("obj-{i}").as_bytes()).unwrap(), i);
        }
        assert!(semantic.lookup(b"obj-100").is_err());
    }
}
