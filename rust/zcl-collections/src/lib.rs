// zcl-collections: container types backing the store and the runtime

//! # zcl-collections
//!
//! - **hashmap**: generic open-addressing hash map (linear probing,
//!   tombstones) used for small id-keyed tables.
//! - **chmap**: concurrent oid-indexed map with per-bucket read/write locks
//!   and refcounted entries; backs the object cache.
//! - **avl**: arena-backed AVL tree; backs the free-extent index of the
//!   space allocator.
//! - **skiplist**: randomised-level sorted list with an undo journal for
//!   commit/rollback; backs the flat semantic layer.

pub mod avl;
pub mod chmap;
pub mod hashmap;
pub mod skiplist;

pub use avl::AvlTree;
pub use chmap::ChMap;
pub use hashmap::OpenHashMap;
pub use skiplist::SkipList;
