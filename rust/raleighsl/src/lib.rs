// raleighsl: pluggable transactional object store

//! # raleighsl
//!
//! The object-store core: named, typed, logical objects (the counter is
//! the canonical type) held in a concurrent object cache, coordinated
//! through a read/write/commit/lock discipline, and mutated only through
//! reversible transaction atoms.
//!
//! Every swappable concern is a plugin family identified by UUID:
//! `Semantic` (name -> oid), `Key` (32-byte comparison keys), `Object`
//! (typed object behavior), `Space` (extent allocation), `Device` (byte
//! storage) and `Format` (which plugins a store was written with). The
//! [`PluginRegistry`] maps UUIDs to live plugin instances; opening a store
//! whose format names an unknown UUID is refused.

pub mod cache;
pub mod device;
pub mod error;
pub mod format;
pub mod key;
pub mod object;
pub mod objects;
pub mod plugins;
pub mod semantic;
pub mod space;
pub mod store;
pub mod txn;
pub mod wire;

pub use error::{StoreError, StoreResult};
pub use object::{Object, ObjectState};
pub use plugins::{
    DevicePlugin, FormatPlugin, KeyPlugin, ObjectPlugin, PlugInfo, PlugKind, PluginRegistry,
    SemanticPlugin, SpacePlugin, TxnAtomOp,
};
pub use store::Storage;
pub use txn::{Transaction, TxnManager, TxnState};
