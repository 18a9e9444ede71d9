// zcl-dblock: AVL16 sorted-set block
//
// Layout:
//   header | index entries (growing up) | free | record arena (growing down)
//
// Each index entry is 8 bytes: a packed node word (left:14 right:14
// balance:2 tombstone:1) plus the u32 arena offset of the node's record.
// Records hold the key with front-prefix compression against the
// insert-time in-order predecessor: when the stored prefix is non-zero the
// record names its base node, and the full key materialises by walking the
// base chain. The arena is append-only; deletion sets the tombstone bit and
// reclaims nothing.

use crate::{BlockCursor, BlockError, BlockOps, Item, Kv, KvStats, MapOpts, MapStats, SeekPos};
use std::cmp::Ordering;
use zcl_core::coding::{decode_u16, decode_u32, decode_uint, encode_u16, encode_u32, encode_uint, uint_size};

pub const HEADER_SIZE: usize = 48;
const NODE_NIL: u16 = 0x3fff;
const MAX_NODES: u16 = NODE_NIL - 1;
const INDEX_ENTRY_SIZE: usize = 8;
/// Worst case per-insert overhead beyond key+value bytes: index entry,
/// record head byte, prefix varint, base index, mid-size and value-size
/// varints.
const MAX_OVERHEAD: u32 = (INDEX_ENTRY_SIZE + 1 + 4 + 2 + 4 + 4) as u32;

const OFF_KIND: usize = 0;
const OFF_FLAGS: usize = 1;
const OFF_KV_COUNT: usize = 2;
const OFF_BLK_SIZE: usize = 4;
const OFF_BLK_AVAIL: usize = 8;
const OFF_ROOT: usize = 12;
const OFF_NODE_COUNT: usize = 14;
const OFF_ARENA_TAIL: usize = 16;
const OFF_STATS: usize = 20;

const FLAG_SORTED: u8 = 0x01;

const TOMBSTONE_BIT: u32 = 1 << 30;

#[inline]
fn get_u16(block: &[u8], off: usize) -> u16 {
    decode_u16(&block[off..])
}

#[inline]
fn put_u16(block: &mut [u8], off: usize, v: u16) {
    encode_u16(&mut block[off..], v)
}

#[inline]
fn get_u32(block: &[u8], off: usize) -> u32 {
    decode_u32(&block[off..])
}

#[inline]
fn put_u32(block: &mut [u8], off: usize, v: u32) {
    encode_u32(&mut block[off..], v)
}

#[inline]
fn root(block: &[u8]) -> u16 {
    let r = get_u16(block, OFF_ROOT);
    if r == 0 {
        NODE_NIL
    } else {
        r - 1
    }
}

#[inline]
fn set_root(block: &mut [u8], idx: u16) {
    put_u16(block, OFF_ROOT, if idx == NODE_NIL { 0 } else { idx + 1 });
}

#[inline]
fn index_off(idx: u16) -> usize {
    HEADER_SIZE + (idx as usize) * INDEX_ENTRY_SIZE
}

#[derive(Debug, Clone, Copy)]
struct NodeWord {
    left: u16,
    right: u16,
    balance: i8,
    tombstone: bool,
}

fn node_word(block: &[u8], idx: u16) -> NodeWord {
    let w = get_u32(block, index_off(idx));
    NodeWord {
        left: (w & 0x3fff) as u16,
        right: ((w >> 14) & 0x3fff) as u16,
        balance: (((w >> 28) & 0x3) as i8) - 1,
        tombstone: w & TOMBSTONE_BIT != 0,
    }
}

fn set_node_word(block: &mut [u8], idx: u16, n: NodeWord) {
    debug_assert!((-1..=1).contains(&n.balance));
    let w = u32::from(n.left)
        | (u32::from(n.right) << 14)
        | ((((n.balance + 1) as u32) & 0x3) << 28)
        | if n.tombstone { TOMBSTONE_BIT } else { 0 };
    put_u32(block, index_off(idx), w);
}

#[inline]
fn rec_off(block: &[u8], idx: u16) -> usize {
    get_u32(block, index_off(idx) + 4) as usize
}

#[inline]
fn set_rec_off(block: &mut [u8], idx: u16, off: u32) {
    put_u32(block, index_off(idx) + 4, off);
}

struct Record {
    prefix: u32,
    base: u16,
    mid: std::ops::Range<usize>,
    value: std::ops::Range<usize>,
}

fn parse_record(block: &[u8], off: usize) -> Record {
    let head = block[off];
    let prefix_bytes = ((head >> 5) & 0x7) as usize;
    let mid_bytes = (((head >> 3) & 0x3) as usize) + 1;
    let val_bytes = (((head >> 1) & 0x3) as usize) + 1;
    let mut at = off + 1;
    let mut prefix = 0u32;
    let mut base = NODE_NIL;
    if prefix_bytes > 0 {
        prefix = decode_uint(&block[at..], prefix_bytes) as u32;
        at += prefix_bytes;
        base = decode_u16(&block[at..]);
        at += 2;
    }
    let mid_len = decode_uint(&block[at..], mid_bytes) as usize;
    at += mid_bytes;
    let val_len = decode_uint(&block[at..], val_bytes) as usize;
    at += val_bytes;
    Record {
        prefix,
        base,
        mid: at..at + mid_len,
        value: at + mid_len..at + mid_len + val_len,
    }
}

/// Rebuild the full key of node `idx` into `out` by walking the prefix
/// base chain.
fn key_of(block: &[u8], idx: u16, out: &mut Vec<u8>) {
    let mut parts: Vec<(u32, std::ops::Range<usize>)> = Vec::new();
    let mut cur = idx;
    loop {
        let rec = parse_record(block, rec_off(block, cur));
        let prefix = rec.prefix;
        parts.push((prefix, rec.mid));
        if prefix == 0 {
            break;
        }
        cur = rec.base;
    }
    out.clear();
    for (prefix, mid) in parts.iter().rev() {
        out.truncate(*prefix as usize);
        out.extend_from_slice(&block[mid.clone()]);
    }
}

fn value_of(block: &[u8], idx: u16) -> &[u8] {
    let rec = parse_record(block, rec_off(block, idx));
    &block[rec.value]
}

fn cmp_node_key(block: &[u8], idx: u16, probe: &[u8], scratch: &mut Vec<u8>) -> Ordering {
    key_of(block, idx, scratch);
    scratch.as_slice().cmp(probe)
}

fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[inline]
fn bf(block: &[u8], idx: u16) -> i8 {
    node_word(block, idx).balance
}

fn set_bf(block: &mut [u8], idx: u16, balance: i8) {
    let mut n = node_word(block, idx);
    n.balance = balance;
    set_node_word(block, idx, n);
}

fn set_child(block: &mut [u8], idx: u16, left_side: bool, child: u16) {
    let mut n = node_word(block, idx);
    if left_side {
        n.left = child;
    } else {
        n.right = child;
    }
    set_node_word(block, idx, n);
}

/// Rebalance the left-heavy subtree rooted at `idx`; returns the new root.
fn rotate_right(block: &mut [u8], idx: u16) -> u16 {
    let l = node_word(block, idx).left;
    let lw = node_word(block, l);
    if lw.balance >= 0 {
        set_child(block, idx, true, lw.right);
        set_child(block, l, false, idx);
        if lw.balance == 1 {
            set_bf(block, idx, 0);
            set_bf(block, l, 0);
        } else {
            set_bf(block, idx, 1);
            set_bf(block, l, -1);
        }
        l
    } else {
        let lr = lw.right;
        let lrw = node_word(block, lr);
        set_child(block, l, false, lrw.left);
        set_child(block, idx, true, lrw.right);
        set_child(block, lr, true, l);
        set_child(block, lr, false, idx);
        match lrw.balance {
            1 => {
                set_bf(block, l, 0);
                set_bf(block, idx, -1);
            }
            -1 => {
                set_bf(block, l, 1);
                set_bf(block, idx, 0);
            }
            _ => {
                set_bf(block, l, 0);
                set_bf(block, idx, 0);
            }
        }
        set_bf(block, lr, 0);
        lr
    }
}

/// Rebalance the right-heavy subtree rooted at `idx`; returns the new root.
fn rotate_left(block: &mut [u8], idx: u16) -> u16 {
    let r = node_word(block, idx).right;
    let rw = node_word(block, r);
    if rw.balance <= 0 {
        set_child(block, idx, false, rw.left);
        set_child(block, r, true, idx);
        if rw.balance == -1 {
            set_bf(block, idx, 0);
            set_bf(block, r, 0);
        } else {
            set_bf(block, idx, -1);
            set_bf(block, r, 1);
        }
        r
    } else {
        let rl = rw.left;
        let rlw = node_word(block, rl);
        set_child(block, r, true, rlw.right);
        set_child(block, idx, false, rlw.left);
        set_child(block, rl, false, r);
        set_child(block, rl, true, idx);
        match rlw.balance {
            -1 => {
                set_bf(block, r, 0);
                set_bf(block, idx, 1);
            }
            1 => {
                set_bf(block, r, -1);
                set_bf(block, idx, 0);
            }
            _ => {
                set_bf(block, r, 0);
                set_bf(block, idx, 0);
            }
        }
        set_bf(block, rl, 0);
        rl
    }
}

fn find_node(block: &[u8], key: &[u8]) -> Option<u16> {
    let mut scratch = Vec::new();
    let mut at = root(block);
    while at != NODE_NIL {
        let n = node_word(block, at);
        match cmp_node_key(block, at, key, &mut scratch) {
            Ordering::Equal => return Some(at),
            Ordering::Greater => at = n.left,
            Ordering::Less => at = n.right,
        }
    }
    None
}

/// Smallest live node with key > probe (`strict`) or >= probe.
fn find_ceil(block: &[u8], probe: &[u8], strict: bool) -> Option<u16> {
    let mut scratch = Vec::new();
    let mut at = root(block);
    let mut best = NODE_NIL;
    while at != NODE_NIL {
        let n = node_word(block, at);
        let cmp = cmp_node_key(block, at, probe, &mut scratch);
        let above = cmp == Ordering::Greater || (!strict && cmp == Ordering::Equal);
        if above {
            best = at;
            at = n.left;
        } else {
            at = n.right;
        }
    }
    skip_dead_forward(block, best)
}

/// Greatest live node with key < probe.
fn find_floor(block: &[u8], probe: &[u8]) -> Option<u16> {
    let mut scratch = Vec::new();
    let mut at = root(block);
    let mut best = NODE_NIL;
    while at != NODE_NIL {
        let n = node_word(block, at);
        if cmp_node_key(block, at, probe, &mut scratch) == Ordering::Less {
            best = at;
            at = n.right;
        } else {
            at = n.left;
        }
    }
    skip_dead_backward(block, best)
}

fn skip_dead_forward(block: &[u8], idx: u16) -> Option<u16> {
    let mut at = idx;
    let mut key = Vec::new();
    while at != NODE_NIL && node_word(block, at).tombstone {
        key_of(block, at, &mut key);
        at = raw_ceil(block, &key, true);
    }
    (at != NODE_NIL).then_some(at)
}

fn skip_dead_backward(block: &[u8], idx: u16) -> Option<u16> {
    let mut at = idx;
    let mut key = Vec::new();
    while at != NODE_NIL && node_word(block, at).tombstone {
        key_of(block, at, &mut key);
        at = raw_floor(block, &key);
    }
    (at != NODE_NIL).then_some(at)
}

/// Like [`find_ceil`] but without tombstone filtering.
fn raw_ceil(block: &[u8], probe: &[u8], strict: bool) -> u16 {
    let mut scratch = Vec::new();
    let mut at = root(block);
    let mut best = NODE_NIL;
    while at != NODE_NIL {
        let n = node_word(block, at);
        let cmp = cmp_node_key(block, at, probe, &mut scratch);
        let above = cmp == Ordering::Greater || (!strict && cmp == Ordering::Equal);
        if above {
            best = at;
            at = n.left;
        } else {
            at = n.right;
        }
    }
    best
}

fn raw_floor(block: &[u8], probe: &[u8]) -> u16 {
    let mut scratch = Vec::new();
    let mut at = root(block);
    let mut best = NODE_NIL;
    while at != NODE_NIL {
        let n = node_word(block, at);
        if cmp_node_key(block, at, probe, &mut scratch) == Ordering::Less {
            best = at;
            at = n.right;
        } else {
            at = n.left;
        }
    }
    best
}

fn leftmost(block: &[u8]) -> Option<u16> {
    let mut at = root(block);
    if at == NODE_NIL {
        return None;
    }
    loop {
        let n = node_word(block, at);
        if n.left == NODE_NIL {
            break;
        }
        at = n.left;
    }
    skip_dead_forward(block, at)
}

fn rightmost(block: &[u8]) -> Option<u16> {
    let mut at = root(block);
    if at == NODE_NIL {
        return None;
    }
    loop {
        let n = node_word(block, at);
        if n.right == NODE_NIL {
            break;
        }
        at = n.right;
    }
    skip_dead_backward(block, at)
}

fn read_stats(block: &[u8]) -> KvStats {
    KvStats {
        ksize_min: get_u32(block, OFF_STATS),
        ksize_max: get_u32(block, OFF_STATS + 4),
        ksize_total: get_u32(block, OFF_STATS + 8),
        vsize_min: get_u32(block, OFF_STATS + 12),
        vsize_max: get_u32(block, OFF_STATS + 16),
        vsize_total: get_u32(block, OFF_STATS + 20),
    }
}

fn write_stats(block: &mut [u8], stats: &KvStats) {
    put_u32(block, OFF_STATS, stats.ksize_min);
    put_u32(block, OFF_STATS + 4, stats.ksize_max);
    put_u32(block, OFF_STATS + 8, stats.ksize_total);
    put_u32(block, OFF_STATS + 12, stats.vsize_min);
    put_u32(block, OFF_STATS + 16, stats.vsize_max);
    put_u32(block, OFF_STATS + 20, stats.vsize_total);
}

/// Encode a record into the arena; returns (record offset, record length).
fn write_record(
    block: &mut [u8],
    kv: &Kv<'_>,
    prefix: usize,
    base: u16,
) -> (u32, u32) {
    let mid = &kv.key[prefix..];
    let prefix_bytes = if prefix > 0 { uint_size(prefix as u64) } else { 0 };
    let mid_bytes = uint_size(mid.len() as u64);
    let val_bytes = uint_size(kv.value.len() as u64);
    let rec_len = 1
        + prefix_bytes
        + if prefix > 0 { 2 } else { 0 }
        + mid_bytes
        + val_bytes
        + mid.len()
        + kv.value.len();

    let tail = get_u32(block, OFF_ARENA_TAIL) as usize;
    let off = tail - rec_len;
    let mut at = off;
    block[at] = ((prefix_bytes as u8) << 5)
        | (((mid_bytes - 1) as u8) << 3)
        | (((val_bytes - 1) as u8) << 1);
    at += 1;
    if prefix > 0 {
        encode_uint(&mut block[at..], prefix_bytes, prefix as u64);
        at += prefix_bytes;
        put_u16(block, at, base);
        at += 2;
    }
    encode_uint(&mut block[at..], mid_bytes, mid.len() as u64);
    at += mid_bytes;
    encode_uint(&mut block[at..], val_bytes, kv.value.len() as u64);
    at += val_bytes;
    block[at..at + mid.len()].copy_from_slice(mid);
    at += mid.len();
    block[at..at + kv.value.len()].copy_from_slice(kv.value);
    put_u32(block, OFF_ARENA_TAIL, off as u32);
    (off as u32, rec_len as u32)
}

/// AVL16 operation table.
pub struct Avl16Map;

impl BlockOps for Avl16Map {
    fn init(&self, block: &mut [u8], opts: &MapOpts) {
        let blk_size = opts.blk_size as usize;
        assert!(blk_size <= block.len() && blk_size > HEADER_SIZE + 64);
        block[OFF_KIND] = crate::KIND_AVL16;
        block[OFF_FLAGS] = FLAG_SORTED;
        put_u16(block, OFF_KV_COUNT, 0);
        put_u32(block, OFF_BLK_SIZE, opts.blk_size);
        put_u32(block, OFF_BLK_AVAIL, (blk_size - HEADER_SIZE) as u32);
        set_root(block, NODE_NIL);
        put_u16(block, OFF_NODE_COUNT, 0);
        put_u32(block, OFF_ARENA_TAIL, opts.blk_size);
        write_stats(block, &KvStats::default());
    }

    fn lookup(&self, block: &[u8], key: &[u8]) -> Option<Vec<u8>> {
        let idx = find_node(block, key)?;
        if node_word(block, idx).tombstone {
            return None;
        }
        Some(value_of(block, idx).to_vec())
    }

    fn first_key(&self, block: &[u8]) -> Option<Vec<u8>> {
        let idx = leftmost(block)?;
        let mut key = Vec::new();
        key_of(block, idx, &mut key);
        Some(key)
    }

    fn last_key(&self, block: &[u8]) -> Option<Vec<u8>> {
        let idx = rightmost(block)?;
        let mut key = Vec::new();
        key_of(block, idx, &mut key);
        Some(key)
    }

    fn get_iptr(&self, block: &[u8], iptr: u32) -> Option<Item> {
        let idx = iptr as u16;
        if u32::from(idx) != iptr || idx >= get_u16(block, OFF_NODE_COUNT) {
            return None;
        }
        if node_word(block, idx).tombstone {
            return None;
        }
        let mut key = Vec::new();
        key_of(block, idx, &mut key);
        Some((key, value_of(block, idx).to_vec()))
    }

    fn seek<'a>(
        &self,
        block: &'a [u8],
        pos: SeekPos<'_>,
    ) -> Option<Box<dyn BlockCursor + 'a>> {
        let idx = match pos {
            SeekPos::Begin => leftmost(block)?,
            SeekPos::End => rightmost(block)?,
            SeekPos::Key(probe) => find_ceil(block, probe, false)?,
            SeekPos::KeyExact(probe) => {
                let idx = find_node(block, probe)?;
                if node_word(block, idx).tombstone {
                    return None;
                }
                idx
            }
        };
        let mut key = Vec::new();
        key_of(block, idx, &mut key);
        Some(Box::new(Avl16Cursor { block, cur: idx, key }))
    }

    fn insert(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError> {
        if kv.key.len() >= u32::MAX as usize || kv.value.len() >= u32::MAX as usize {
            return Err(BlockError::TooLarge);
        }
        if !self.has_space(block, kv) {
            return Err(BlockError::Full);
        }
        let node_count = get_u16(block, OFF_NODE_COUNT);

        // descend, remembering the path and the in-order predecessor
        let mut scratch = Vec::new();
        let mut pred: Option<(u16, Vec<u8>)> = None;
        let mut path: Vec<(u16, bool)> = Vec::new(); // (node, went_left)
        let mut at = root(block);
        let mut existing = None;
        while at != NODE_NIL {
            let n = node_word(block, at);
            match cmp_node_key(block, at, kv.key, &mut scratch) {
                Ordering::Equal => {
                    existing = Some(at);
                    break;
                }
                Ordering::Greater => {
                    path.push((at, true));
                    at = n.left;
                }
                Ordering::Less => {
                    pred = Some((at, scratch.clone()));
                    path.push((at, false));
                    at = n.right;
                }
            }
        }

        if let Some(idx) = existing {
            // upsert: append a replacement record, revive a tombstone
            let was_dead = node_word(block, idx).tombstone;
            let rec = parse_record(block, rec_off(block, idx));
            let (prefix, base) = (rec.prefix as usize, rec.base);
            let (off, rec_len) = write_record(block, kv, prefix, base);
            set_rec_off(block, idx, off);
            let avail = get_u32(block, OFF_BLK_AVAIL) - rec_len;
            put_u32(block, OFF_BLK_AVAIL, avail);
            if was_dead {
                let mut n = node_word(block, idx);
                n.tombstone = false;
                set_node_word(block, idx, n);
                put_u16(block, OFF_KV_COUNT, get_u16(block, OFF_KV_COUNT) + 1);
            }
            let mut stats = read_stats(block);
            stats.update(kv);
            write_stats(block, &stats);
            return Ok(u32::from(idx));
        }

        if node_count >= MAX_NODES {
            return Err(BlockError::Full);
        }

        let (prefix, base) = match &pred {
            Some((idx, key)) => (shared_prefix(key, kv.key), *idx),
            None => (0, NODE_NIL),
        };
        let (off, rec_len) = write_record(block, kv, prefix, base);

        let idx = node_count;
        put_u16(block, OFF_NODE_COUNT, node_count + 1);
        set_node_word(
            block,
            idx,
            NodeWord {
                left: NODE_NIL,
                right: NODE_NIL,
                balance: 0,
                tombstone: false,
            },
        );
        set_rec_off(block, idx, off);

        match path.last() {
            Some(&(parent, went_left)) => set_child(block, parent, went_left, idx),
            None => set_root(block, idx),
        }

        // retrace with balance factors
        for i in (0..path.len()).rev() {
            let (node, went_left) = path[i];
            let nb = bf(block, node) + if went_left { 1 } else { -1 };
            if nb == 0 {
                set_bf(block, node, 0);
                break;
            }
            if nb == 1 || nb == -1 {
                set_bf(block, node, nb);
                continue;
            }
            let new_sub = if nb > 1 {
                rotate_right(block, node)
            } else {
                rotate_left(block, node)
            };
            match i.checked_sub(1).map(|j| path[j]) {
                Some((parent, parent_left)) => set_child(block, parent, parent_left, new_sub),
                None => set_root(block, new_sub),
            }
            break;
        }

        let avail = get_u32(block, OFF_BLK_AVAIL) - rec_len - INDEX_ENTRY_SIZE as u32;
        put_u32(block, OFF_BLK_AVAIL, avail);
        put_u16(block, OFF_KV_COUNT, get_u16(block, OFF_KV_COUNT) + 1);
        let mut stats = read_stats(block);
        stats.update(kv);
        write_stats(block, &stats);
        Ok(u32::from(idx))
    }

    fn append(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError> {
        // ordering hint; the insert path stays correct either way
        debug_assert!(self
            .last_key(block)
            .map_or(true, |last| last.as_slice() < kv.key));
        self.insert(block, kv)
    }

    fn prepend(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError> {
        debug_assert!(self
            .first_key(block)
            .map_or(true, |first| kv.key < first.as_slice()));
        self.insert(block, kv)
    }

    fn remove(&self, block: &mut [u8], key: &[u8]) -> Result<(), BlockError> {
        let idx = find_node(block, key).ok_or(BlockError::NotFound)?;
        let mut n = node_word(block, idx);
        if n.tombstone {
            return Err(BlockError::NotFound);
        }
        n.tombstone = true;
        set_node_word(block, idx, n);
        put_u16(block, OFF_KV_COUNT, get_u16(block, OFF_KV_COUNT) - 1);
        Ok(())
    }

    fn has_space(&self, block: &[u8], kv: &Kv<'_>) -> bool {
        let need = MAX_OVERHEAD as u64 + kv.key.len() as u64 + kv.value.len() as u64;
        u64::from(get_u32(block, OFF_BLK_AVAIL)) >= need
            && get_u16(block, OFF_NODE_COUNT) < MAX_NODES
    }

    fn max_overhead(&self, _block: &[u8]) -> u32 {
        MAX_OVERHEAD
    }

    fn stats(&self, block: &[u8]) -> MapStats {
        MapStats {
            blk_size: get_u32(block, OFF_BLK_SIZE),
            blk_avail: get_u32(block, OFF_BLK_AVAIL),
            kv_count: u32::from(get_u16(block, OFF_KV_COUNT)),
            is_sorted: block[OFF_FLAGS] & FLAG_SORTED != 0,
            kv_stats: read_stats(block),
        }
    }
}

struct Avl16Cursor<'a> {
    block: &'a [u8],
    cur: u16,
    key: Vec<u8>,
}

impl<'a> Avl16Cursor<'a> {
    fn move_to(&mut self, idx: Option<u16>) -> bool {
        match idx {
            Some(idx) => {
                self.cur = idx;
                key_of(self.block, idx, &mut self.key);
                true
            }
            None => false,
        }
    }
}

impl<'a> BlockCursor for Avl16Cursor<'a> {
    fn seek_next(&mut self) -> bool {
        let next = find_ceil(self.block, &self.key.clone(), true);
        self.move_to(next)
    }

    fn seek_prev(&mut self) -> bool {
        let prev = find_floor(self.block, &self.key.clone());
        self.move_to(prev)
    }

    fn item(&self) -> Item {
        (self.key.clone(), value_of(self.block, self.cur).to_vec())
    }

    fn iptr(&self) -> u32 {
        u32::from(self.cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AVL16_MAP;
    use proptest::prelude::*;

    fn new_block(size: u32) -> Vec<u8> {
        let mut block = vec![0u8; size as usize];
        AVL16_MAP.init(&mut block, &MapOpts { blk_size: size });
        block
    }

    fn collect(block: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        if let Some(mut cursor) = AVL16_MAP.seek(block, SeekPos::Begin) {
            loop {
                out.push(cursor.item());
                if !cursor.seek_next() {
                    break;
                }
            }
        }
        out
    }

    #[test]
    fn test_insert_and_iterate_sorted() {
        let mut block = new_block(4096);
        for (k, v) in [("banana", "1"), ("apple", "2"), ("cherry", "3")] {
            AVL16_MAP
                .insert(&mut block, &Kv::new(k.as_bytes(), v.as_bytes()))
                .unwrap();
        }
        assert_eq!(AVL16_MAP.first_key(&block).unwrap(), b"apple");
        assert_eq!(AVL16_MAP.last_key(&block).unwrap(), b"cherry");
        let items = collect(&block);
        assert_eq!(
            items,
            vec![
                (b"apple".to_vec(), b"2".to_vec()),
                (b"banana".to_vec(), b"1".to_vec()),
                (b"cherry".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn test_lookup() {
        let mut block = new_block(4096);
        AVL16_MAP
            .insert(&mut block, &Kv::new(b"alpha", b"one"))
            .unwrap();
        AVL16_MAP
            .insert(&mut block, &Kv::new(b"beta", b"two"))
            .unwrap();
        assert_eq!(AVL16_MAP.lookup(&block, b"alpha"), Some(b"one".to_vec()));
        assert_eq!(AVL16_MAP.lookup(&block, b"gamma"), None);
    }

    #[test]
    fn test_block_conservation() {
        // avail shrinks by exactly overhead + klen + vlen for
        // prefix-free keys
        let mut block = new_block(4096);
        let kv = Kv::new(b"abcdef", b"0123456789");
        let before = AVL16_MAP.stats(&block).blk_avail;
        AVL16_MAP.insert(&mut block, &kv).unwrap();
        let after = AVL16_MAP.stats(&block).blk_avail;
        // index entry + head + mid-size + value-size varints
        let overhead = 8 + 1 + 1 + 1;
        assert_eq!(before - after, overhead + 6 + 10);
        assert_eq!(AVL16_MAP.stats(&block).kv_count, 1);
    }

    #[test]
    fn test_failed_insert_leaves_block_identical() {
        let mut block = new_block(256);
        AVL16_MAP.insert(&mut block, &Kv::new(b"k1", b"v1")).unwrap();
        let snapshot = block.clone();
        let huge = vec![0xabu8; 4096];
        assert_eq!(
            AVL16_MAP.insert(&mut block, &Kv::new(b"k2", &huge)),
            Err(BlockError::Full)
        );
        assert_eq!(block, snapshot);
    }

    #[test]
    fn test_prefix_compression_shares_front_bytes() {
        let mut block = new_block(4096);
        let before = AVL16_MAP.stats(&block).blk_avail;
        AVL16_MAP
            .insert(&mut block, &Kv::new(b"user:0001", b"a"))
            .unwrap();
        let mid = AVL16_MAP.stats(&block).blk_avail;
        AVL16_MAP
            .insert(&mut block, &Kv::new(b"user:0002", b"b"))
            .unwrap();
        let after = AVL16_MAP.stats(&block).blk_avail;
        // the second record stores prefix metadata plus one mid byte
        assert!(mid - after < before - mid);
        assert_eq!(
            collect(&block)
                .into_iter()
                .map(|(k, _)| k)
                .collect::<Vec<_>>(),
            vec![b"user:0001".to_vec(), b"user:0002".to_vec()]
        );
    }

    #[test]
    fn test_tombstone_remove_and_revive() {
        let mut block = new_block(4096);
        for k in ["a", "b", "c"] {
            AVL16_MAP
                .insert(&mut block, &Kv::new(k.as_bytes(), b"x"))
                .unwrap();
        }
        AVL16_MAP.remove(&mut block, b"b").unwrap();
        assert_eq!(AVL16_MAP.remove(&mut block, b"b"), Err(BlockError::NotFound));
        assert_eq!(AVL16_MAP.lookup(&block, b"b"), None);
        assert_eq!(AVL16_MAP.stats(&block).kv_count, 2);
        let keys: Vec<_> = collect(&block).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
        // re-insert revives the node
        AVL16_MAP.insert(&mut block, &Kv::new(b"b", b"y")).unwrap();
        assert_eq!(AVL16_MAP.lookup(&block, b"b"), Some(b"y".to_vec()));
        assert_eq!(AVL16_MAP.stats(&block).kv_count, 3);
    }

    #[test]
    fn test_seek_positions() {
        let mut block = new_block(4096);
        for k in ["bb", "dd", "ff"] {
            AVL16_MAP
                .insert(&mut block, &Kv::new(k.as_bytes(), k.as_bytes()))
                .unwrap();
        }
        let cursor = AVL16_MAP.seek(&block, SeekPos::Key(b"cc")).unwrap();
        assert_eq!(cursor.item().0, b"dd");
        assert!(AVL16_MAP.seek(&block, SeekPos::KeyExact(b"cc")).is_none());
        let cursor = AVL16_MAP.seek(&block, SeekPos::KeyExact(b"ff")).unwrap();
        assert_eq!(cursor.item().0, b"ff");
        let mut cursor = AVL16_MAP.seek(&block, SeekPos::End).unwrap();
        assert_eq!(cursor.item().0, b"ff");
        assert!(cursor.seek_prev());
        assert_eq!(cursor.item().0, b"dd");
        assert!(cursor.seek_prev());
        assert!(!cursor.seek_prev());
    }

    #[test]
    fn test_upsert_replaces_value() {
        let mut block = new_block(4096);
        AVL16_MAP.insert(&mut block, &Kv::new(b"k", b"old")).unwrap();
        AVL16_MAP.insert(&mut block, &Kv::new(b"k", b"new")).unwrap();
        assert_eq!(AVL16_MAP.lookup(&block, b"k"), Some(b"new".to_vec()));
        assert_eq!(AVL16_MAP.stats(&block).kv_count, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_iteration_sorted_no_dup(keys in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 1..24), 1..120)) {
            // any insertion order iterates in ascending byte-lex order
            let mut block = new_block(64 * 1024);
            let mut model = std::collections::BTreeMap::new();
            for (i, key) in keys.iter().enumerate() {
                let value = vec![(i & 0xff) as u8; 3];
                AVL16_MAP.insert(&mut block, &Kv::new(key, &value)).unwrap();
                model.insert(key.clone(), value);
            }
            let got = collect(&block);
            let want: Vec<_> = model.into_iter().collect();
            prop_assert_eq!(got, want);
        }
    }
}
