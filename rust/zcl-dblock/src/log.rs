// zcl-dblock: append-only log block
// Records are appended in arrival order and indexed by a 16-bucket hash
// table of chain heads; lookup walks the bucket chain newest-first, so a
// re-appended key shadows its older records. Iteration is insertion order.

use crate::{BlockCursor, BlockError, BlockOps, Item, Kv, KvStats, MapOpts, MapStats, SeekPos};
use zcl_core::coding::{decode_u16, decode_u32, decode_uint, encode_u16, encode_u32, encode_uint, uint_size};

pub const HEADER_SIZE: usize = 104;
const BUCKETS: usize = 16;

const OFF_KIND: usize = 0;
const OFF_FLAGS: usize = 1;
const OFF_KV_COUNT: usize = 2;
const OFF_BLK_SIZE: usize = 4;
const OFF_BLK_AVAIL: usize = 8;
const OFF_NEXT: usize = 12;
const OFF_BUCKETS: usize = 16; // 16 x u32 chain heads (offset+1, 0 = none)
const OFF_STATS: usize = 80;

/// chain link + head byte + two 4-byte size varints
const MAX_OVERHEAD: u32 = 4 + 1 + 4 + 4;

#[inline]
fn get_u32(block: &[u8], off: usize) -> u32 {
    decode_u32(&block[off..])
}

#[inline]
fn put_u32(block: &mut [u8], off: usize, v: u32) {
    encode_u32(&mut block[off..], v)
}

fn fnv1a(key: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in key {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[inline]
fn bucket_off(key: &[u8]) -> usize {
    OFF_BUCKETS + (fnv1a(key) as usize % BUCKETS) * 4
}

struct Record {
    chain: u32, // offset+1 of the previous record in this bucket, 0 = none
    key: std::ops::Range<usize>,
    value: std::ops::Range<usize>,
    end: usize,
}

fn parse_record(block: &[u8], off: usize) -> Record {
    let chain = get_u32(block, off);
    let head = block[off + 4];
    let key_bytes = (((head >> 2) & 0x3) as usize) + 1;
    let val_bytes = ((head & 0x3) as usize) + 1;
    let mut at = off + 5;
    let key_len = decode_uint(&block[at..], key_bytes) as usize;
    at += key_bytes;
    let val_len = decode_uint(&block[at..], val_bytes) as usize;
    at += val_bytes;
    Record {
        chain,
        key: at..at + key_len,
        value: at + key_len..at + key_len + val_len,
        end: at + key_len + val_len,
    }
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

/// Log block operation table.
pub struct LogMap;

impl BlockOps for LogMap {
    fn init(&self, block: &mut [u8], opts: &MapOpts) {
        let blk_size = opts.blk_size as usize;
        assert!(blk_size <= block.len() && blk_size > HEADER_SIZE + 32);
        block[OFF_KIND] = crate::KIND_LOG;
        block[OFF_FLAGS] = 0;
        encode_u16(&mut block[OFF_KV_COUNT..], 0);
        put_u32(block, OFF_BLK_SIZE, opts.blk_size);
        put_u32(block, OFF_BLK_AVAIL, (blk_size - HEADER_SIZE) as u32);
        put_u32(block, OFF_NEXT, HEADER_SIZE as u32);
        for i in 0..BUCKETS {
            put_u32(block, OFF_BUCKETS + i * 4, 0);
        }
        write_stats(block, &KvStats::default());
    }

    fn lookup(&self, block: &[u8], key: &[u8]) -> Option<Vec<u8>> {
        let mut at = get_u32(block, bucket_off(key));
        while at != 0 {
            let rec = parse_record(block, (at - 1) as usize);
            if &block[rec.key.clone()] == key {
                return Some(block[rec.value].to_vec());
            }
            at = rec.chain;
        }
        None
    }

    fn first_key(&self, block: &[u8]) -> Option<Vec<u8>> {
        let next = get_u32(block, OFF_NEXT) as usize;
        if next == HEADER_SIZE {
            return None;
        }
        let rec = parse_record(block, HEADER_SIZE);
        Some(block[rec.key].to_vec())
    }

    fn last_key(&self, block: &[u8]) -> Option<Vec<u8>> {
        let mut last = None;
        let mut at = HEADER_SIZE;
        let next = get_u32(block, OFF_NEXT) as usize;
        while at < next {
            let rec = parse_record(block, at);
            last = Some(block[rec.key].to_vec());
            at = rec.end;
        }
        last
    }

    fn get_iptr(&self, block: &[u8], iptr: u32) -> Option<Item> {
        let off = iptr as usize;
        if off < HEADER_SIZE || off >= get_u32(block, OFF_NEXT) as usize {
            return None;
        }
        let rec = parse_record(block, off);
        Some((block[rec.key].to_vec(), block[rec.value].to_vec()))
    }

    fn seek<'a>(
        &self,
        block: &'a [u8],
        pos: SeekPos<'_>,
    ) -> Option<Box<dyn BlockCursor + 'a>> {
        let next = get_u32(block, OFF_NEXT) as usize;
        if next == HEADER_SIZE {
            return None;
        }
        let off = match pos {
            SeekPos::Begin => HEADER_SIZE,
            SeekPos::End => {
                let mut at = HEADER_SIZE;
                let mut last = HEADER_SIZE;
                while at < next {
                    last = at;
                    at = parse_record(block, at).end;
                }
                last
            }
            // a log block has no key order; exact positioning walks the
            // insertion sequence
            SeekPos::Key(probe) | SeekPos::KeyExact(probe) => {
                let mut at = HEADER_SIZE;
                let mut found = None;
                while at < next {
                    let rec = parse_record(block, at);
                    if &block[rec.key.clone()] == probe {
                        found = Some(at);
                        break;
                    }
                    at = rec.end;
                }
                found?
            }
        };
        Some(Box::new(LogCursor { block, off }))
    }

    fn insert(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError> {
        self.append(block, kv)
    }

    fn append(&self, block: &mut [u8], kv: &Kv<'_>) -> Result<u32, BlockError> {
        if kv.key.len() >= u32::MAX as usize || kv.value.len() >= u32::MAX as usize {
            return Err(BlockError::TooLarge);
        }
        if !self.has_space(block, kv) {
            return Err(BlockError::Full);
        }
        let key_bytes = uint_size(kv.key.len() as u64);
        let val_bytes = uint_size(kv.value.len() as u64);
        let rec_len = 4 + 1 + key_bytes + val_bytes + kv.key.len() + kv.value.len();

        let off = get_u32(block, OFF_NEXT) as usize;
        let boff = bucket_off(kv.key);
        let chain_head = get_u32(block, boff);

        let mut at = off;
        put_u32(block, at, chain_head);
        at += 4;
        block[at] = (((key_bytes - 1) as u8) << 2) | ((val_bytes - 1) as u8);
        at += 1;
        encode_uint(&mut block[at..], key_bytes, kv.key.len() as u64);
        at += key_bytes;
        encode_uint(&mut block[at..], val_bytes, kv.value.len() as u64);
        at += val_bytes;
        block[at..at + kv.key.len()].copy_from_slice(kv.key);
        at += kv.key.len();
        block[at..at + kv.value.len()].copy_from_slice(kv.value);

        put_u32(block, boff, (off + 1) as u32);
        put_u32(block, OFF_NEXT, (off + rec_len) as u32);
        put_u32(
            block,
            OFF_BLK_AVAIL,
            get_u32(block, OFF_BLK_AVAIL) - rec_len as u32,
        );
        encode_u16(
            &mut block[OFF_KV_COUNT..],
            decode_u16(&block[OFF_KV_COUNT..]) + 1,
        );
        let mut stats = read_stats(block);
        stats.update(kv);
        write_stats(block, &stats);
        Ok(off as u32)
    }

    fn prepend(&self, _block: &mut [u8], _kv: &Kv<'_>) -> Result<u32, BlockError> {
        Err(BlockError::Unsupported)
    }

    fn remove(&self, _block: &mut [u8], _key: &[u8]) -> Result<(), BlockError> {
        Err(BlockError::Unsupported)
    }

    fn has_space(&self, block: &[u8], kv: &Kv<'_>) -> bool {
        let need = MAX_OVERHEAD as u64 + kv.key.len() as u64 + kv.value.len() as u64;
        u64::from(get_u32(block, OFF_BLK_AVAIL)) >= need
    }

    fn max_overhead(&self, _block: &[u8]) -> u32 {
        MAX_OVERHEAD
    }

    fn stats(&self, block: &[u8]) -> MapStats {
        MapStats {
            blk_size: get_u32(block, OFF_BLK_SIZE),
            blk_avail: get_u32(block, OFF_BLK_AVAIL),
            kv_count: u32::from(decode_u16(&block[OFF_KV_COUNT..])),
            is_sorted: false,
            kv_stats: read_stats(block),
        }
    }
}

struct LogCursor<'a> {
    block: &'a [u8],
    off: usize,
}

impl<'a> BlockCursor for LogCursor<'a> {
    fn seek_next(&mut self) -> bool {
        let next = parse_record(self.block, self.off).end;
        if next >= get_u32(self.block, OFF_NEXT) as usize {
            return false;
        }
        self.off = next;
        true
    }

    fn seek_prev(&mut self) -> bool {
        if self.off == HEADER_SIZE {
            return false;
        }
        let mut at = HEADER_SIZE;
        let mut prev = HEADER_SIZE;
        while at < self.off {
            prev = at;
            at = parse_record(self.block, at).end;
        }
        self.off = prev;
        true
    }

    fn item(&self) -> Item {
        let rec = parse_record(self.block, self.off);
        (
            self.block[rec.key].to_vec(),
            self.block[rec.value].to_vec(),
        )
    }

    fn iptr(&self) -> u32 {
        self.off as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LOG_MAP;

    fn new_block(size: u32) -> Vec<u8> {
        let mut block = vec![0u8; size as usize];
        LOG_MAP.init(&mut block, &MapOpts { blk_size: size });
        block
    }

    #[test]
    fn test_append_lookup_insertion_order() {
        let mut block = new_block(4096);
        for (k, v) in [("zeta", "1"), ("alpha", "2"), ("mid", "3")] {
            LOG_MAP
                .append(&mut block, &Kv::new(k.as_bytes(), v.as_bytes()))
                .unwrap();
        }
        assert_eq!(LOG_MAP.lookup(&block, b"alpha"), Some(b"2".to_vec()));
        assert_eq!(LOG_MAP.lookup(&block, b"nope"), None);
        // iteration preserves arrival order, not key order
        let mut cursor = LOG_MAP.seek(&block, SeekPos::Begin).unwrap();
        let mut keys = vec![cursor.item().0];
        while cursor.seek_next() {
            keys.push(cursor.item().0);
        }
        assert_eq!(
            keys,
            vec![b"zeta".to_vec(), b"alpha".to_vec(), b"mid".to_vec()]
        );
    }

    #[test]
    fn test_reappend_shadows_older_record() {
        let mut block = new_block(4096);
        LOG_MAP.append(&mut block, &Kv::new(b"k", b"old")).unwrap();
        LOG_MAP.append(&mut block, &Kv::new(b"k", b"new")).unwrap();
        assert_eq!(LOG_MAP.lookup(&block, b"k"), Some(b"new".to_vec()));
    }

    #[test]
    fn test_full_block_rejects_append() {
        let mut block = new_block(160);
        LOG_MAP.append(&mut block, &Kv::new(b"a", b"bb")).unwrap();
        let snapshot = block.clone();
        let big = vec![1u8; 256];
        assert_eq!(
            LOG_MAP.append(&mut block, &Kv::new(b"c", &big)),
            Err(BlockError::Full)
        );
        assert_eq!(block, snapshot);
    }

    #[test]
    fn test_conservation_and_stats() {
        let mut block = new_block(4096);
        let before = LOG_MAP.stats(&block).blk_avail;
        LOG_MAP
            .append(&mut block, &Kv::new(b"key00", b"value0000"))
            .unwrap();
        let stats = LOG_MAP.stats(&block);
        assert_eq!(before - stats.blk_avail, 4 + 1 + 1 + 1 + 5 + 9);
        assert_eq!(stats.kv_count, 1);
        assert_eq!(stats.kv_stats.ksize_min, 5);
        assert_eq!(stats.kv_stats.vsize_max, 9);
        assert!(!stats.is_sorted);
    }

    #[test]
    fn test_unsupported_ops() {
        let mut block = new_block(1024);
        assert_eq!(
            LOG_MAP.prepend(&mut block, &Kv::new(b"k", b"v")),
            Err(BlockError::Unsupported)
        );
        assert_eq!(LOG_MAP.remove(&mut block, b"k"), Err(BlockError::Unsupported));
    }
}
