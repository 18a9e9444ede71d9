// zcl-buffers: data buffer
// Chain of 256-byte nodes holding length-prefixed records. A record is
// either an inline byte run `[len][len bytes]` or a reference record
// `[0xfe][idx]` pointing into the node's side table of Bytes handles, which
// the reader emits without copying. 0xff marks end-of-node.

use smallvec::SmallVec;
use std::collections::VecDeque;
use zcl_core::Bytes;

pub const NODE_CAPACITY: usize = 256;
const EON: u8 = 0xff;
const REF_MARK: u8 = 0xfe;
/// Largest inline record payload.
pub const RECORD_MAX: usize = 0xfd;

struct Node {
    data: [u8; NODE_CAPACITY],
    used: usize,
    refs: Vec<Bytes>,
}

impl Node {
    fn new() -> Self {
        Self {
            data: [EON; NODE_CAPACITY],
            used: 0,
            refs: Vec::new(),
        }
    }

    #[inline]
    fn avail(&self) -> usize {
        NODE_CAPACITY - self.used
    }

    /// (payload length, total record length) of the record at `off`.
    fn record_at(&self, off: usize) -> (usize, usize) {
        match self.data[off] {
            REF_MARK => {
                let idx = self.data[off + 1] as usize;
                (self.refs[idx].len(), 2)
            }
            len => (len as usize, 1 + len as usize),
        }
    }
}

/// Write-side/read-side data buffer. Writers append records at the tail;
/// the reader consumes payload bytes from the front. `size()` counts
/// payload bytes only, never record headers.
pub struct DBuf {
    nodes: VecDeque<Node>,
    size: usize,
    /// Offset of the still-extendable inline record header in the tail node.
    open: Option<usize>,
    /// Offset of the front record header in the head node.
    front_rec: usize,
    /// Payload bytes already consumed from the front record.
    front_skip: usize,
}

impl DBuf {
    pub fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
            size: 0,
            open: None,
            front_rec: 0,
            front_skip: 0,
        }
    }

    /// Payload bytes currently held.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.size = 0;
        self.open = None;
        self.front_rec = 0;
        self.front_skip = 0;
    }

    fn push_node(&mut self) {
        self.nodes.push_back(Node::new());
        self.open = None;
    }

    /// Append `data`, extending the open record and spanning nodes as
    /// needed.
    pub fn add(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            // extend the open record if it still has headroom
            if let Some(h) = self.open {
                let tail = self.nodes.back_mut().expect("open record without node");
                let len = tail.data[h] as usize;
                let room = (RECORD_MAX - len).min(tail.avail());
                if room > 0 {
                    let take = data.len().min(room);
                    let at = tail.used;
                    tail.data[at..at + take].copy_from_slice(&data[..take]);
                    tail.used += take;
                    tail.data[h] = (len + take) as u8;
                    self.size += take;
                    data = &data[take..];
                    continue;
                }
                self.open = None;
            }
            // need room for a header plus at least one payload byte
            if self.nodes.back().map_or(0, Node::avail) < 2 {
                self.push_node();
            }
            let tail = self.nodes.back_mut().expect("tail node");
            let take = data.len().min(RECORD_MAX).min(tail.avail() - 1);
            let h = tail.used;
            tail.data[h] = take as u8;
            tail.data[h + 1..h + 1 + take].copy_from_slice(&data[..take]);
            tail.used += 1 + take;
            self.open = Some(h);
            self.size += take;
            data = &data[take..];
        }
    }

    /// Append a reference record; the reader will emit the referenced bytes
    /// without copying them into the chain.
    pub fn add_ref(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        let need_node = match self.nodes.back() {
            Some(n) => n.avail() < 2 || n.refs.len() == usize::from(u8::MAX),
            None => true,
        };
        if need_node {
            self.push_node();
        }
        let tail = self.nodes.back_mut().expect("tail node");
        let at = tail.used;
        tail.data[at] = REF_MARK;
        tail.data[at + 1] = tail.refs.len() as u8;
        tail.used += 2;
        self.size += bytes.len();
        tail.refs.push(bytes);
        self.open = None;
    }

    /// Reserve a writable span of `max` bytes (at most [`RECORD_MAX`]) in
    /// the current node, let `f` fill it and return the bytes used, then
    /// commit that many. This is the scratch-free path for encoders that
    /// need a contiguous destination.
    pub fn append_with<F>(&mut self, max: usize, f: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        assert!(max <= RECORD_MAX);
        if self.nodes.back().map_or(0, Node::avail) < max + 1 {
            self.push_node();
        }
        let tail = self.nodes.back_mut().expect("tail node");
        let h = tail.used;
        let used = f(&mut tail.data[h + 1..h + 1 + max]);
        debug_assert!(used <= max);
        tail.data[h] = used as u8;
        tail.used += 1 + used;
        self.open = Some(h);
        self.size += used;
        used
    }

    /// Fill `out` with up to `cap` gather entries describing the next
    /// payload spans. Reference records yield the referenced slice
    /// directly.
    pub fn iov_slices(&self, cap: usize) -> SmallVec<[&[u8]; 16]> {
        let mut out: SmallVec<[&[u8]; 16]> = SmallVec::new();
        let mut skip = self.front_skip;
        let mut rec = self.front_rec;
        for node in &self.nodes {
            while rec < node.used && out.len() < cap {
                let (plen, total) = node.record_at(rec);
                let slice: &[u8] = if node.data[rec] == REF_MARK {
                    let idx = node.data[rec + 1] as usize;
                    &node.refs[idx].as_slice()[skip..]
                } else {
                    &node.data[rec + 1 + skip..rec + 1 + plen]
                };
                if !slice.is_empty() {
                    out.push(slice);
                }
                skip = 0;
                rec += total;
            }
            if out.len() == cap {
                break;
            }
            rec = 0;
        }
        out
    }

    /// Drop the first `n` payload bytes, freeing nodes whose last byte has
    /// been consumed. Returns the number of bytes removed.
    pub fn remove(&mut self, n: usize) -> usize {
        let mut left = n.min(self.size);
        let removed = left;
        self.size -= left;
        loop {
            let Some(head) = self.nodes.front() else {
                break;
            };
            if self.front_rec >= head.used {
                // node exhausted; the tail node is recycled, not freed, so
                // the writer keeps its position
                if self.nodes.len() == 1 {
                    let tail = self.nodes.front_mut().expect("tail node");
                    tail.data = [EON; NODE_CAPACITY];
                    tail.used = 0;
                    tail.refs.clear();
                    self.open = None;
                    self.front_rec = 0;
                    self.front_skip = 0;
                    break;
                }
                self.nodes.pop_front();
                self.front_rec = 0;
                self.front_skip = 0;
                continue;
            }
            if left == 0 {
                break;
            }
            let head = self.nodes.front().expect("head node");
            let (plen, total) = head.record_at(self.front_rec);
            let in_rec = plen - self.front_skip;
            if left >= in_rec {
                left -= in_rec;
                self.front_rec += total;
                self.front_skip = 0;
                if left == 0 && self.front_rec < head.used {
                    break;
                }
            } else {
                self.front_skip += left;
                break;
            }
        }
        removed
    }
}

impl Default for DBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gathered(buf: &DBuf) -> Vec<u8> {
        let mut out = Vec::new();
        for s in buf.iov_slices(usize::MAX) {
            out.extend_from_slice(s);
        }
        out
    }

    #[test]
    fn test_add_spans_nodes() {
        let mut buf = DBuf::new();
        let payload: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        buf.add(&payload);
        assert_eq!(buf.size(), 1000);
        assert_eq!(gathered(&buf), payload);
    }

    #[test]
    fn test_size_counts_payload_only() {
        let mut buf = DBuf::new();
        buf.add(b"abc");
        buf.add(b"defg");
        assert_eq!(buf.size(), 7);
    }

    #[test]
    fn test_add_ref_zero_copy() {
        let mut buf = DBuf::new();
        buf.add(b"head:");
        let blob = Bytes::copy_from_slice(&vec![7u8; 4096]);
        buf.add_ref(blob.clone());
        buf.add(b":tail");
        assert_eq!(buf.size(), 5 + 4096 + 5);
        let iovs = buf.iov_slices(16);
        assert!(iovs.iter().any(|s| s.len() == 4096));
        // the gather entry aliases the Bytes storage, not a copy
        assert!(std::ptr::eq(
            iovs.iter().find(|s| s.len() == 4096).unwrap().as_ptr(),
            blob.as_slice().as_ptr()
        ));
    }

    #[test]
    fn test_append_with_commit() {
        let mut buf = DBuf::new();
        let written = buf.append_with(16, |dst| {
            dst[..5].copy_from_slice(b"hello");
            5
        });
        assert_eq!(written, 5);
        assert_eq!(buf.size(), 5);
        assert_eq!(gathered(&buf), b"hello");
    }

    #[test]
    fn test_remove_partial_and_across_records() {
        let mut buf = DBuf::new();
        buf.add(b"aaaa");
        buf.add_ref(Bytes::copy_from_slice(b"bbbb"));
        buf.add(b"cccc");
        assert_eq!(buf.size(), 12);
        assert_eq!(buf.remove(2), 2);
        assert_eq!(gathered(&buf), b"aabbbbcccc");
        assert_eq!(buf.remove(6), 6);
        assert_eq!(gathered(&buf), b"cccc");
        assert_eq!(buf.remove(10), 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_after_drain_reuses_node() {
        let mut buf = DBuf::new();
        buf.add(b"first");
        buf.remove(5);
        buf.add(b"second");
        assert_eq!(gathered(&buf), b"second");
    }
}
