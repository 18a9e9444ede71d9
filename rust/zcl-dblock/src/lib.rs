// zcl-dblock: fixed-size key/value block formats

//! # zcl-dblock
//!
//! Key/value layouts over a fixed-size byte region ("data block"):
//!
//! - **avl16**: a sorted set indexed by an AVL tree of 16-bit node words
//!   threaded over an append-only record arena; keys are stored with
//!   front-prefix compression against the insert-time predecessor.
//! - **log**: an append-only hash-indexed sequence for workloads that do
//!   not need ordering.
//!
//! Both formats implement [`BlockOps`]; byte 0 of a block identifies its
//! format so [`block_ops`] can dispatch on raw bytes.

pub mod avl16;
pub mod log;

use thiserror::Error;

/// Block format tag stored in byte 0.
pub const KIND_AVL16: u8 = 1;
pub const KIND_LOG: u8 = 2;

/// One key/value pair by reference.
#[derive(Debug, Clone, Copy)]
pub struct Kv<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> Kv<'a> {
    pub fn new(key: &'a [u8], value: &'a [u8]) -> Self {
        Self { key, value }
    }
}

/// Running min/max/total sizes of the keys and values in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvStats {
    pub ksize_min: u32,
    pub ksize_max: u32,
    pub ksize_total: u32,
    pub vsize_min: u32,
    pub vsize_max: u32,
    pub vsize_total: u32,
}

impl Default for KvStats {
    fn default() -> Self {
        Self {
            ksize_min: u32::MAX,
            ksize_max: 0,
            ksize_total: 0,
            vsize_min: u32::MAX,
            vsize_max: 0,
            vsize_total: 0,
        }
    }
}

impl KvStats {
    pub fn update(&mut self, kv: &Kv<'_>) {
        let (k, v) = (kv.key.len() as u32, kv.value.len() as u32);
        self.ksize_min = self.ksize_min.min(k);
        self.ksize_max = self.ksize_max.max(k);
        self.ksize_total += k;
        self.vsize_min = self.vsize_min.min(v);
        self.vsize_max = self.vsize_max.max(v);
        self.vsize_total += v;
    }
}

/// Point-in-time block statistics.
#[derive(Debug, Clone, Copy)]
pub struct MapStats {
    pub blk_size: u32,
    pub blk_avail: u32,
    pub kv_count: u32,
    pub is_sorted: bool,
    pub kv_stats: KvStats,
}

/// Block construction options.
#[derive(Debug, Clone, Copy)]
pub struct MapOpts {
    pub blk_size: u32,
}

/// Iterator positioning request.
#[derive(Debug, Clone, Copy)]
pub enum SeekPos<'a> {
    Begin,
    End,
    /// First key >= the probe.
    Key(&'a [u8]),
    /// Exactly the probe, or nothing.
    KeyExact(&'a [u8]),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block is full")]
    Full,
    #[error("key or value too large for the block format")]
    TooLarge,
    #[error("operation not supported by this block format")]
    Unsupported,
    #[error("key not found")]
    NotFound,
    #[error("block bytes failed validation")]
    Corrupt,
}

/// Materialised cursor position: an owned key (prefix decompression may
/// rebuild it) and the in-block value span.
pub type Item = (Vec<u8>, Vec<u8>);

/// Cursor over a block, produced by [`BlockOps::seek`].
pub trait BlockCursor {
    /// Advance; returns false at the end.
    fn seek_next(&mut self) -> bool;
    /// Step back; returns false at the beginning.
    fn seek_prev(&mut self) -> bool;
    /// Materialise the current key/value.
    fn item(&self) -> Item;
    /// Index pointer of the current entry (format-specific).
    fn iptr(&self) -> u32;
}

/// The operation surface shared by every block format.
pub trait BlockOps: Sync {
    fn init(&self, block: &mut [u8], opts: &MapOpts);
    fn lookup(&self, block: &[u8], key: &[u8]) -> Option<Vec<u8>>;
    fn first_key(&self, block: &[u8]) -> Option<Vec<u8>>;
    fn last_key(&self, block: &[u8]) -> Option<Vec<u8>>;
    /// Fetch by index pointer.
    fn get_iptr(&self, block: &[u8], iptr: u32) -> Option<Item>;
    fn seek<'a>(
        &self,
        block: &'a [u8],
        pos: SeekPos<'_>,
    ) -> Option<Box<dyn BlockCursor + 'a>>;
    fn insert(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError>;
    fn append(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError>;
    fn prepend(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError>;
    /// Mark the entry for `key` deleted. Formats without deletion return
    /// [`BlockError::Unsupported`].
    fn remove(&self, block: &mut [u8], key: &[u8]) -> Result<(), BlockError>;
    fn has_space(&self, block: &[u8], kv: &Kv<'_>) -> bool;
    /// Worst-case bytes consumed by one more insert beyond the payload.
    fn max_overhead(&self, block: &[u8]) -> u32;
    fn stats(&self, block: &[u8]) -> MapStats;
}

pub static AVL16_MAP: avl16::Avl16Map = avl16::Avl16Map;
pub static LOG_MAP: log::LogMap = log::LogMap;

/// Resolve the operation table for a formatted block from its format tag.
pub fn block_ops(block: &[u8]) -> Option<&'static dyn BlockOps> {
    match block.first()? {
        &KIND_AVL16 => Some(&AVL16_MAP),
        &KIND_LOG => Some(&LOG_MAP),
        _ => None,
    }
}
