// raleighsl: store facade
// Wires the plugin set chosen by the format, owns the object cache, the
// oid allocator and the transaction manager, and enforces the lock
// discipline around every operation: read for queries, a write slot plus a
// commit phase for mutations.

use crate::cache::ObjectCache;
use crate::error::{StoreError, StoreResult};
use crate::object::Object;
use crate::plugins::{
    DevicePlugin, FormatPlugin, KeyPlugin, PluginRegistry, SemanticPlugin, SpacePlugin,
};
use crate::txn::TxnManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// First oid handed out; low ids stay reserved for store metadata.
const FIRST_OID: u64 = 16;

pub struct Storage {
    registry: Arc<PluginRegistry>,
    format: Arc<dyn FormatPlugin>,
    semantic: Arc<dyn SemanticPlugin>,
    key: Arc<dyn KeyPlugin>,
    space: Arc<dyn SpacePlugin>,
    device: Arc<dyn DevicePlugin>,
    cache: ObjectCache,
    txns: TxnManager,
    next_oid: AtomicU64,
}

impl Storage {
    /// Open a store: resolve the format's plugin UUIDs through the
    /// registry (refusing unknowns) and initialise the semantic layer.
    pub fn open(
        registry: Arc<PluginRegistry>,
        format_uuid: &Uuid,
        device_uuid: &Uuid,
        cache_buckets: u32,
    ) -> StoreResult<Storage> {
        let format = registry.format(format_uuid)?;
        format.init()?;
        let semantic = registry.semantic(&format.semantic_uuid())?;
        let space = registry.space(&format.space_uuid())?;
        let key = registry.key(&format.key_uuid())?;
        let device = registry.device(device_uuid)?;

        semantic.init()?;
        info!(
            format = format.info().label,
            semantic = semantic.info().label,
            space = space.info().label,
            key = key.info().label,
            device = device.info().label,
            "store opened"
        );

        Ok(Storage {
            registry,
            format,
            semantic,
            key,
            space,
            device,
            cache: ObjectCache::new(cache_buckets),
            txns: TxnManager::new(),
            next_oid: AtomicU64::new(FIRST_OID),
        })
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn semantic(&self) -> &dyn SemanticPlugin {
        self.semantic.as_ref()
    }

    pub fn key_plugin(&self) -> &dyn KeyPlugin {
        self.key.as_ref()
    }

    pub fn space(&self) -> &dyn SpacePlugin {
        self.space.as_ref()
    }

    pub fn device(&self) -> &dyn DevicePlugin {
        self.device.as_ref()
    }

    pub fn format(&self) -> &dyn FormatPlugin {
        self.format.as_ref()
    }

    pub fn object_count(&self) -> u32 {
        self.cache.len()
    }

    fn allocate_oid(&self) -> u64 {
        self.next_oid.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a named object of the given type. The naming mutation and
    /// the object creation commit together.
    pub fn create(&self, name: &[u8], type_uuid: &Uuid) -> StoreResult<u64> {
        if name.is_empty() {
            return Err(StoreError::InvalidArgument("empty object name".into()));
        }
        let plug = self.registry.object(type_uuid)?;
        let oid = self.allocate_oid();
        self.semantic.create(name, oid)?;

        let state = match plug.create() {
            Ok(state) => state,
            Err(err) => {
                self.semantic.rollback()?;
                return Err(err);
            }
        };
        let object = Arc::new(Object::new(oid, plug, state));
        let (_, inserted) = self.cache.insert(object);
        if !inserted {
            self.semantic.rollback()?;
            return Err(StoreError::Corrupt(format!("oid {oid} already cached")));
        }
        self.semantic.commit()?;
        debug!(oid, "object created");
        Ok(oid)
    }

    /// Resolve a name to the live object.
    pub fn lookup(&self, name: &[u8]) -> StoreResult<Arc<Object>> {
        let oid = self.semantic.lookup(name)?;
        // this store keeps every live object cached; a miss would mean the
        // semantic layer and the cache disagree
        self.cache.lookup(oid).ok_or(StoreError::NotFound)
    }

    pub fn lookup_oid(&self, name: &[u8]) -> StoreResult<u64> {
        self.semantic.lookup(name)
    }

    pub fn object_by_oid(&self, oid: u64) -> StoreResult<Arc<Object>> {
        self.cache.lookup(oid).ok_or(StoreError::NotFound)
    }

    /// Remove the name binding and drop the object from the cache. The
    /// object's memory is released when the last handle drops.
    pub fn unlink(&self, name: &[u8]) -> StoreResult<u64> {
        let oid = self.semantic.unlink(name)?;
        if let Some(object) = self.cache.remove(oid) {
            while !object.lock.try_acquire_write() {
                std::hint::spin_loop();
            }
            let result = object.with_state_mut(|state| object.plug.unlink(state));
            object.lock.release_write();
            if let Err(err) = result {
                self.semantic.rollback()?;
                return Err(err);
            }
        }
        self.semantic.commit()?;
        debug!(oid, "object unlinked");
        Ok(oid)
    }

    /// Read-only operation under the object's read mode.
    pub fn query(&self, object: &Object, op_code: u32, body: &[u8]) -> StoreResult<Vec<u8>> {
        while !object.lock.try_acquire_read() {
            // a commit phase is draining readers; wait it out
            std::hint::spin_loop();
        }
        let result = object.with_state(|state| object.plug.query(state, op_code, body));
        object.lock.release_read();
        result
    }

    /// Mutating operation as a single-atom transaction: prepare, apply
    /// under the write slot, commit through the quiesce phase.
    pub fn update(&self, object: &Arc<Object>, op_code: u32, body: &[u8]) -> StoreResult<Vec<u8>> {
        let txn_id = self.txns.begin();
        match self.update_in_txn(txn_id, object, op_code, body) {
            Ok(reply) => {
                self.txns.commit(txn_id, self.semantic.as_ref())?;
                Ok(reply)
            }
            Err(err) => {
                self.txns.rollback(txn_id, self.semantic.as_ref())?;
                Err(err)
            }
        }
    }

    /// Begin a multi-operation transaction.
    pub fn txn_begin(&self) -> u64 {
        self.txns.begin()
    }

    /// Apply one mutating operation inside an open transaction.
    pub fn update_in_txn(
        &self,
        txn_id: u64,
        object: &Arc<Object>,
        op_code: u32,
        body: &[u8],
    ) -> StoreResult<Vec<u8>> {
        let op = object.with_state(|state| object.plug.prepare(state, op_code, body))?;
        self.txns.apply(txn_id, object, op)
    }

    pub fn txn_commit(&self, txn_id: u64) -> StoreResult<()> {
        self.txns.commit(txn_id, self.semantic.as_ref())
    }

    pub fn txn_rollback(&self, txn_id: u64) -> StoreResult<()> {
        self.txns.rollback(txn_id, self.semantic.as_ref())
    }

    /// Flush every layer through its sync hook.
    pub fn sync(&self) -> StoreResult<()> {
        self.semantic.sync()?;
        self.space.sync()?;
        self.device.sync()?;
        self.format.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;
    use crate::format::{FormatV1, FORMAT_V1_UUID};
    use crate::key::{FlatKey, FLAT_KEY_UUID};
    use crate::objects::counter::{self, COUNTER_OBJECT_UUID};
    use crate::objects::CounterObject;
    use crate::semantic::{FlatSemantic, FLAT_SEMANTIC_UUID};
    use crate::space::{ExtentSpace, EXTENT_SPACE_UUID};
    use crate::wire;

    fn test_registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.register_semantic(Arc::new(FlatSemantic::new()));
        registry.register_key(Arc::new(FlatKey::new()));
        registry.register_space(Arc::new(ExtentSpace::new()));
        registry.register_device(Arc::new(MemDevice::new(1 << 20)));
        registry.register_object(Arc::new(CounterObject::new()));
        registry.register_format(Arc::new(FormatV1::new(
            FLAT_SEMANTIC_UUID,
            EXTENT_SPACE_UUID,
            FLAT_KEY_UUID,
        )));
        Arc::new(registry)
    }

    fn open_store() -> Storage {
        Storage::open(
            test_registry(),
            &FORMAT_V1_UUID,
            &crate::device::MEM_DEVICE_UUID,
            64,
        )
        .unwrap()
    }

    fn incr_body(delta: u64) -> Vec<u8> {
        let mut out = Vec::new();
        wire::put_u64(&mut out, wire::FIELD_DELTA, delta);
        out
    }

    fn reply_pair(reply: &[u8]) -> (u64, u64) {
        (
            wire::need_u64(reply, wire::FIELD_VALUE).unwrap(),
            wire::need_u64(reply, wire::FIELD_CAS).unwrap(),
        )
    }

    #[test]
    fn test_open_refuses_unknown_plugin_uuid() {
        let mut registry = PluginRegistry::new();
        registry.register_format(Arc::new(FormatV1::new(
            Uuid::from_bytes([9u8; 16]), // not registered
            EXTENT_SPACE_UUID,
            FLAT_KEY_UUID,
        )));
        registry.register_space(Arc::new(ExtentSpace::new()));
        registry.register_key(Arc::new(FlatKey::new()));
        registry.register_device(Arc::new(MemDevice::new(1024)));
        let err = Storage::open(
            Arc::new(registry),
            &FORMAT_V1_UUID,
            &crate::device::MEM_DEVICE_UUID,
            16,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_create_lookup_unlink_lifecycle() {
        let store = open_store();
        let oid = store.create(b"hits", &COUNTER_OBJECT_UUID).unwrap();
        assert_eq!(store.lookup_oid(b"hits").unwrap(), oid);
        let object = store.lookup(b"hits").unwrap();
        assert_eq!(object.oid, oid);
        assert_eq!(store.object_count(), 1);

        assert_eq!(
            store.create(b"hits", &COUNTER_OBJECT_UUID),
            Err(StoreError::AlreadyExists)
        );

        assert_eq!(store.unlink(b"hits").unwrap(), oid);
        assert!(matches!(store.lookup(b"hits"), Err(StoreError::NotFound)));
        assert_eq!(store.object_count(), 0);
        // the held handle stays usable until dropped
        assert_eq!(object.oid, oid);
    }

    #[test]
    fn test_counter_end_to_end_ops() {
        let store = open_store();
        store.create(b"hits", &COUNTER_OBJECT_UUID).unwrap();
        let object = store.lookup(b"hits").unwrap();

        let reply = store
            .update(&object, counter::OP_INCR, &incr_body(5))
            .unwrap();
        assert_eq!(reply_pair(&reply), (5, 1));
        let reply = store
            .update(&object, counter::OP_INCR, &incr_body(3))
            .unwrap();
        assert_eq!(reply_pair(&reply), (8, 2));
        let reply = store.query(&object, counter::OP_GET, &[]).unwrap();
        assert_eq!(reply_pair(&reply), (8, 2));
    }

    #[test]
    fn test_transaction_rollback_restores_state() {
        // a rolled-back transaction reverts every applied atom
        let store = open_store();
        store.create(b"a", &COUNTER_OBJECT_UUID).unwrap();
        let object = store.lookup(b"a").unwrap();
        store
            .update(&object, counter::OP_INCR, &incr_body(10))
            .unwrap();

        let txn = store.txn_begin();
        store
            .update_in_txn(txn, &object, counter::OP_INCR, &incr_body(7))
            .unwrap();
        store
            .update_in_txn(txn, &object, counter::OP_INCR, &incr_body(5))
            .unwrap();
        store.txn_rollback(txn).unwrap();

        let reply = store.query(&object, counter::OP_GET, &[]).unwrap();
        assert_eq!(reply_pair(&reply), (10, 1));
    }

    #[test]
    fn test_transaction_commit_keeps_state() {
        let store = open_store();
        store.create(b"a", &COUNTER_OBJECT_UUID).unwrap();
        let object = store.lookup(b"a").unwrap();

        let txn = store.txn_begin();
        store
            .update_in_txn(txn, &object, counter::OP_INCR, &incr_body(2))
            .unwrap();
        store
            .update_in_txn(txn, &object, counter::OP_INCR, &incr_body(3))
            .unwrap();
        store.txn_commit(txn).unwrap();

        let reply = store.query(&object, counter::OP_GET, &[]).unwrap();
        assert_eq!(reply_pair(&reply), (5, 2));
        assert_eq!(object.lock.state(), 0);
    }

    #[test]
    fn test_concurrent_readers_one_writer() {
        // final value is exact; readers observe non-decreasing (cas, value)
        let store = Arc::new(open_store());
        store.create(b"c", &COUNTER_OBJECT_UUID).unwrap();
        let object = store.lookup(b"c").unwrap();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let object = Arc::clone(&object);
            readers.push(std::thread::spawn(move || {
                let mut last = (0u64, 0u64);
                for _ in 0..2_000 {
                    let reply = store.query(&object, counter::OP_GET, &[]).unwrap();
                    let pair = (
                        wire::need_u64(&reply, wire::FIELD_CAS).unwrap(),
                        wire::need_u64(&reply, wire::FIELD_VALUE).unwrap(),
                    );
                    assert!(pair >= last, "cas went backwards: {pair:?} < {last:?}");
                    last = pair;
                }
            }));
        }

        let writer = {
            let store = Arc::clone(&store);
            let object = Arc::clone(&object);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    store
                        .update(&object, counter::OP_INCR, &incr_body(1))
                        .unwrap();
                }
            })
        };

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        let reply = store.query(&object, counter::OP_GET, &[]).unwrap();
        assert_eq!(reply_pair(&reply), (10_000, 10_000));
    }
}
