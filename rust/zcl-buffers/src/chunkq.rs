// zcl-buffers: chunk queue
// FIFO of fixed-size chunks with a read cursor in the head chunk. Bytes go
// in at the tail and come out at the head; search and tokenize helpers walk
// the logical byte stream without flattening it.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

const DEFAULT_CHUNK_SIZE: usize = 4096;

struct Chunk {
    data: Box<[u8]>,
    start: usize,
    used: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            start: 0,
            used: 0,
        }
    }

    #[inline]
    fn readable(&self) -> &[u8] {
        &self.data[self.start..self.used]
    }

    #[inline]
    fn avail(&self) -> usize {
        self.data.len() - self.used
    }
}

/// A token located in the queue: `offset` is relative to the read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: usize,
    pub length: usize,
}

/// FIFO byte queue backed by fixed-size chunks.
pub struct ChunkQ {
    chunks: VecDeque<Chunk>,
    chunk_size: usize,
    size: usize,
}

impl ChunkQ {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        Self {
            chunks: VecDeque::new(),
            chunk_size,
            size: 0,
        }
    }

    /// Number of readable bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Read cursor within the head chunk.
    pub fn offset(&self) -> usize {
        self.chunks.front().map_or(0, |c| c.start)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }

    /// Append `data` at the tail, spanning chunks as needed.
    pub fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if self.chunks.back().map_or(0, Chunk::avail) == 0 {
                self.chunks.push_back(Chunk::new(self.chunk_size));
            }
            let tail = self.chunks.back_mut().expect("tail chunk");
            let n = data.len().min(tail.avail());
            tail.data[tail.used..tail.used + n].copy_from_slice(&data[..n]);
            tail.used += n;
            self.size += n;
            data = &data[n..];
        }
    }

    /// Insert `data` in front of the read cursor.
    pub fn prepend(&mut self, data: &[u8]) {
        for piece in data.rchunks(self.chunk_size) {
            let mut chunk = Chunk::new(self.chunk_size.max(piece.len()));
            chunk.data[..piece.len()].copy_from_slice(piece);
            chunk.used = piece.len();
            self.chunks.push_front(chunk);
            self.size += piece.len();
        }
    }

    /// Copy up to `out.len()` bytes from the head into `out` and advance the
    /// cursor. Returns the number of bytes copied.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let n = self.read_at(0, out);
        self.remove(n);
        n
    }

    /// Copy bytes starting `offset` past the cursor, without advancing.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        let mut skipped = 0usize;
        let mut copied = 0usize;
        for chunk in &self.chunks {
            let data = chunk.readable();
            let mut from = 0usize;
            if skipped < offset {
                let skip = (offset - skipped).min(data.len());
                skipped += skip;
                from = skip;
                if from == data.len() {
                    continue;
                }
            }
            let n = (data.len() - from).min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&data[from..from + n]);
            copied += n;
            if copied == out.len() {
                break;
            }
        }
        copied
    }

    /// Advance the cursor by `n` bytes, releasing exhausted chunks.
    /// Returns the number of bytes actually removed.
    pub fn remove(&mut self, mut n: usize) -> usize {
        let mut removed = 0usize;
        while n > 0 {
            let Some(head) = self.chunks.front_mut() else {
                break;
            };
            let take = n.min(head.used - head.start);
            head.start += take;
            removed += take;
            n -= take;
            if head.start == head.used {
                self.chunks.pop_front();
            }
        }
        self.size -= removed;
        removed
    }

    fn byte_at(&self, mut offset: usize) -> Option<u8> {
        for chunk in &self.chunks {
            let data = chunk.readable();
            if offset < data.len() {
                return Some(data[offset]);
            }
            offset -= data.len();
        }
        None
    }

    /// Index of the first occurrence of `needle` at or after `offset`,
    /// relative to the read cursor.
    pub fn indexof(&self, offset: usize, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || self.size < needle.len() {
            return None;
        }
        'outer: for at in offset..=(self.size - needle.len()) {
            for (i, &b) in needle.iter().enumerate() {
                if self.byte_at(at + i) != Some(b) {
                    continue 'outer;
                }
            }
            return Some(at);
        }
        None
    }

    /// Compare the bytes at `offset` against `other`. Returns false when the
    /// queue holds fewer than `other.len()` bytes past `offset`.
    pub fn memcmp_at(&self, offset: usize, other: &[u8]) -> bool {
        if self.size < offset + other.len() {
            return false;
        }
        other
            .iter()
            .enumerate()
            .all(|(i, &b)| self.byte_at(offset + i) == Some(b))
    }

    /// Locate the next token at or after `offset`, where a token is a
    /// maximal run of bytes not in `delims`.
    pub fn tokenize(&self, offset: usize, delims: &[u8]) -> Option<Extent> {
        let mut at = offset;
        while let Some(b) = self.byte_at(at) {
            if !delims.contains(&b) {
                break;
            }
            at += 1;
        }
        if at >= self.size {
            return None;
        }
        let mut end = at;
        while let Some(b) = self.byte_at(end) {
            if delims.contains(&b) {
                break;
            }
            end += 1;
        }
        Some(Extent {
            offset: at,
            length: end - at,
        })
    }

    /// Parse `length` bytes at `offset` as a decimal u64.
    pub fn parse_u64(&self, offset: usize, length: usize) -> Option<u64> {
        if length == 0 || self.size < offset + length {
            return None;
        }
        let mut value: u64 = 0;
        for i in 0..length {
            let b = self.byte_at(offset + i)?;
            if !b.is_ascii_digit() {
                return None;
            }
            value = value
                .checked_mul(10)?
                .checked_add(u64::from(b - b'0'))?;
        }
        Some(value)
    }

    /// Fill the tail from `reader` with a single read call. Returns the
    /// number of bytes appended (0 on EOF).
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.chunks.back().map_or(0, Chunk::avail) == 0 {
            self.chunks.push_back(Chunk::new(self.chunk_size));
        }
        let tail = self.chunks.back_mut().expect("tail chunk");
        let n = reader.read(&mut tail.data[tail.used..])?;
        tail.used += n;
        self.size += n;
        Ok(n)
    }

    /// Push the head span to `writer` with a single write call and remove
    /// the written bytes.
    pub fn drain_to<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let Some(head) = self.chunks.front() else {
            return Ok(0);
        };
        let n = writer.write(head.readable())?;
        self.remove(n);
        Ok(n)
    }
}

impl Default for ChunkQ {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_pop_spans_chunks() {
        let mut q = ChunkQ::with_chunk_size(8);
        q.append(b"hello world, this spans chunks");
        assert_eq!(q.size(), 31);
        let mut out = vec![0u8; 31];
        assert_eq!(q.pop(&mut out), 31);
        assert_eq!(&out, b"hello world, this spans chunks");
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_tracks_cursor() {
        let mut q = ChunkQ::with_chunk_size(4);
        q.append(b"abcdefgh");
        q.remove(3);
        assert_eq!(q.size(), 5);
        assert_eq!(q.offset(), 3);
        let mut out = [0u8; 5];
        q.pop(&mut out);
        assert_eq!(&out, b"defgh");
    }

    #[test]
    fn test_prepend() {
        let mut q = ChunkQ::with_chunk_size(4);
        q.append(b"world");
        q.prepend(b"hello ");
        let mut out = vec![0u8; q.size()];
        q.pop(&mut out);
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn test_indexof_across_chunks() {
        let mut q = ChunkQ::with_chunk_size(4);
        q.append(b"GET key\r\n");
        assert_eq!(q.indexof(0, b"\n"), Some(8));
        assert_eq!(q.indexof(0, b"key"), Some(4));
        assert_eq!(q.indexof(5, b"key"), None);
    }

    #[test]
    fn test_tokenize() {
        let mut q = ChunkQ::with_chunk_size(4);
        q.append(b"  set  counter 42\r\n");
        let t0 = q.tokenize(0, b" \t\r\n").unwrap();
        assert_eq!((t0.offset, t0.length), (2, 3));
        let t1 = q.tokenize(t0.offset + t0.length, b" \t\r\n").unwrap();
        assert_eq!((t1.offset, t1.length), (7, 7));
        let t2 = q.tokenize(t1.offset + t1.length, b" \t\r\n").unwrap();
        assert_eq!(q.parse_u64(t2.offset, t2.length), Some(42));
    }

    #[test]
    fn test_memcmp_at() {
        let mut q = ChunkQ::with_chunk_size(4);
        q.append(b"abcdef");
        assert!(q.memcmp_at(2, b"cde"));
        assert!(!q.memcmp_at(2, b"cdx"));
        assert!(!q.memcmp_at(5, b"fg"));
    }

    #[test]
    fn test_model_equivalence() {
        use proptest::prelude::*;
        proptest!(|(ops in proptest::collection::vec(
            (any::<bool>(), proptest::collection::vec(any::<u8>(), 0..48)), 1..80))| {
            let mut q = ChunkQ::with_chunk_size(16);
            let mut model: Vec<u8> = Vec::new();
            for (push, data) in ops {
                if push || model.is_empty() {
                    q.append(&data);
                    model.extend_from_slice(&data);
                } else {
                    let n = data.len().min(model.len());
                    let mut out = vec![0u8; n];
                    prop_assert_eq!(q.pop(&mut out), n);
                    let expect: Vec<u8> = model.drain(..n).collect();
                    prop_assert_eq!(out, expect);
                }
                prop_assert_eq!(q.size(), model.len());
            }
        });
    }

    #[test]
    fn test_fill_and_drain_io() {
        let mut q = ChunkQ::with_chunk_size(16);
        let mut src: &[u8] = b"streamed bytes";
        q.fill_from(&mut src).unwrap();
        assert_eq!(q.size(), 14);
        let mut sink = Vec::new();
        while q.size() > 0 {
            q.drain_to(&mut sink).unwrap();
        }
        assert_eq!(&sink, b"streamed bytes");
    }
}
