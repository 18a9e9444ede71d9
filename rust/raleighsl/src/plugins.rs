// raleighsl: plugin families and the UUID registry
// Each family is a capability set over opaque state, identified for
// persistence by a 16-byte UUID. Loading a store that names a UUID absent
// from the registry is refused.

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectState;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugKind {
    Semantic,
    ObjectCache,
    Object,
    Format,
    Device,
    Space,
    Key,
}

/// Identity block every plugin carries.
#[derive(Debug, Clone)]
pub struct PlugInfo {
    pub uuid: Uuid,
    pub label: &'static str,
    pub description: &'static str,
    pub kind: PlugKind,
}

/// Name -> oid mapping layer.
pub trait SemanticPlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;

    fn init(&self) -> StoreResult<()> {
        Ok(())
    }
    fn load(&self) -> StoreResult<()> {
        Ok(())
    }
    fn unload(&self) -> StoreResult<()> {
        Ok(())
    }
    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Make journaled naming mutations permanent.
    fn commit(&self) -> StoreResult<()>;
    /// Undo journaled naming mutations.
    fn rollback(&self) -> StoreResult<()>;

    fn create(&self, name: &[u8], oid: u64) -> StoreResult<()>;
    fn lookup(&self, name: &[u8]) -> StoreResult<u64>;
    fn unlink(&self, name: &[u8]) -> StoreResult<u64>;
}

/// Derives and orders the 32-byte comparison keys.
pub trait KeyPlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;
    fn derive(&self, name: &[u8]) -> [u8; 32];
    fn compare(&self, a: &[u8; 32], b: &[u8; 32]) -> Ordering;
}

/// One reversible mutation of one object. `apply` performs the mutation
/// and produces the wire reply; `revert` restores the pre-image.
pub trait TxnAtomOp: Send + Sync {
    fn op_code(&self) -> u32;
    fn apply(&mut self, state: &mut dyn ObjectState) -> StoreResult<Vec<u8>>;
    fn revert(&mut self, state: &mut dyn ObjectState);
}

/// Typed object behavior. Mutations never happen directly: `prepare`
/// produces an atom and the mutation runs in the atom's `apply`.
pub trait ObjectPlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;

    fn create(&self) -> StoreResult<Box<dyn ObjectState>>;

    fn open(&self) -> StoreResult<Box<dyn ObjectState>> {
        Err(StoreError::NotSupported)
    }

    fn close(&self, state: &mut dyn ObjectState) -> StoreResult<()> {
        let _ = state;
        Ok(())
    }

    fn unlink(&self, state: &mut dyn ObjectState) -> StoreResult<()> {
        let _ = state;
        Ok(())
    }

    /// Read-only operation.
    fn query(&self, state: &dyn ObjectState, op_code: u32, body: &[u8]) -> StoreResult<Vec<u8>>;

    /// Build the atom for a mutating operation.
    fn prepare(
        &self,
        state: &dyn ObjectState,
        op_code: u32,
        body: &[u8],
    ) -> StoreResult<Box<dyn TxnAtomOp>>;

    /// Commit-phase hook, called with the object quiesced.
    fn commit(&self, state: &mut dyn ObjectState) -> StoreResult<()> {
        let _ = state;
        Ok(())
    }

    fn balance(&self, state: &mut dyn ObjectState) -> StoreResult<()> {
        let _ = state;
        Err(StoreError::NotSupported)
    }

    fn sync(&self, state: &dyn ObjectState) -> StoreResult<()> {
        let _ = state;
        Ok(())
    }
}

/// Extent allocator over a monotonic 64-bit address space.
pub trait SpacePlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;
    /// Allocate `request` units; returns (start, count).
    fn allocate(&self, request: u64) -> StoreResult<(u64, u64)>;
    fn release(&self, start: u64, count: u64) -> StoreResult<()>;
    fn available(&self, start: u64, count: u64) -> bool;
    fn occupied(&self, start: u64, count: u64) -> bool;
    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Byte-addressed storage.
pub trait DevicePlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;
    fn used(&self) -> u64;
    fn free(&self) -> u64;
    fn read(&self, offset: u64, buf: &mut [u8]) -> StoreResult<()>;
    fn write(&self, offset: u64, data: &[u8]) -> StoreResult<()>;
    fn sync(&self) -> StoreResult<()>;
}

/// Names the semantic/space/key plugins a store was written with.
pub trait FormatPlugin: Send + Sync {
    fn info(&self) -> &PlugInfo;
    fn init(&self) -> StoreResult<()> {
        Ok(())
    }
    fn load(&self) -> StoreResult<()> {
        Ok(())
    }
    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
    fn semantic_uuid(&self) -> Uuid;
    fn space_uuid(&self) -> Uuid;
    fn key_uuid(&self) -> Uuid;
}

enum Registered {
    Semantic(Arc<dyn SemanticPlugin>),
    Key(Arc<dyn KeyPlugin>),
    Object(Arc<dyn ObjectPlugin>),
    Space(Arc<dyn SpacePlugin>),
    Device(Arc<dyn DevicePlugin>),
    Format(Arc<dyn FormatPlugin>),
}

/// UUID -> plugin instance table, built by the embedder at startup.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<Uuid, Registered>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_semantic(&mut self, plugin: Arc<dyn SemanticPlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Semantic(plugin));
    }

    pub fn register_key(&mut self, plugin: Arc<dyn KeyPlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Key(plugin));
    }

    pub fn register_object(&mut self, plugin: Arc<dyn ObjectPlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Object(plugin));
    }

    pub fn register_space(&mut self, plugin: Arc<dyn SpacePlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Space(plugin));
    }

    pub fn register_device(&mut self, plugin: Arc<dyn DevicePlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Device(plugin));
    }

    pub fn register_format(&mut self, plugin: Arc<dyn FormatPlugin>) {
        self.plugins
            .insert(plugin.info().uuid, Registered::Format(plugin));
    }

    fn unknown(uuid: &Uuid) -> StoreError {
        StoreError::Corrupt(format!("unknown plugin uuid {uuid}"))
    }

    pub fn semantic(&self, uuid: &Uuid) -> StoreResult<Arc<dyn SemanticPlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Semantic(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }

    pub fn key(&self, uuid: &Uuid) -> StoreResult<Arc<dyn KeyPlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Key(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }

    pub fn object(&self, uuid: &Uuid) -> StoreResult<Arc<dyn ObjectPlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Object(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }

    pub fn space(&self, uuid: &Uuid) -> StoreResult<Arc<dyn SpacePlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Space(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }

    pub fn device(&self, uuid: &Uuid) -> StoreResult<Arc<dyn DevicePlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Device(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }

    pub fn format(&self, uuid: &Uuid) -> StoreResult<Arc<dyn FormatPlugin>> {
        match self.plugins.get(uuid) {
            Some(Registered::Format(p)) => Ok(Arc::clone(p)),
            _ => Err(Self::unknown(uuid)),
        }
    }
}
