// raleighsl: extent space allocator
// Monotonic 64-bit address space with a free-extent index keyed by start
// offset. Allocation reuses the first free extent that fits before bumping
// the watermark; release merges with adjacent free extents.

use crate::error::{StoreError, StoreResult};
use crate::plugins::{PlugInfo, PlugKind, SpacePlugin};
use parking_lot::Mutex;
use uuid::Uuid;
use zcl_collections::AvlTree;

pub const EXTENT_SPACE_UUID: Uuid = Uuid::from_bytes([
    0xd4, 0x3b, 0x2a, 0x90, 0x11, 0x7f, 0x4e, 0x62, 0x95, 0x5d, 0xcb, 0x08, 0x36, 0xe9, 0x14,
    0x77,
]);

struct SpaceInner {
    watermark: u64,
    /// start -> count of free extents; never adjacent, never overlapping.
    free: AvlTree<u64, u64>,
}

pub struct ExtentSpace {
    info: PlugInfo,
    inner: Mutex<SpaceInner>,
}

impl ExtentSpace {
    pub fn new() -> Self {
        Self {
            info: PlugInfo {
                uuid: EXTENT_SPACE_UUID,
                label: "space-extents",
                description: "Extent Space Allocator",
                kind: PlugKind::Space,
            },
            inner: Mutex::new(SpaceInner {
                watermark: 0,
                free: AvlTree::new(),
            }),
        }
    }

    pub fn watermark(&self) -> u64 {
        self.inner.lock().watermark
    }
}

impl Default for ExtentSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SpacePlugin for ExtentSpace {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn allocate(&self, request: u64) -> StoreResult<(u64, u64)> {
        if request == 0 {
            return Err(StoreError::InvalidArgument("zero-length extent".into()));
        }
        let mut inner = self.inner.lock();

        // first free extent large enough
        let found = inner
            .free
            .iter()
            .find(|(_, count)| **count >= request)
            .map(|(start, count)| (*start, *count));
        if let Some((start, count)) = found {
            inner.free.remove(&start);
            if count > request {
                inner.free.insert(start + request, count - request);
            }
            return Ok((start, request));
        }

        let start = inner.watermark;
        inner.watermark = inner
            .watermark
            .checked_add(request)
            .ok_or(StoreError::NoMemory)?;
        Ok((start, request))
    }

    fn release(&self, start: u64, count: u64) -> StoreResult<()> {
        if count == 0 {
            return Err(StoreError::InvalidArgument("zero-length extent".into()));
        }
        let mut inner = self.inner.lock();
        if start + count > inner.watermark {
            return Err(StoreError::InvalidArgument(
                "release beyond the watermark".into(),
            ));
        }

        let mut start = start;
        let mut count = count;

        // merge the free extent ending exactly at `start`
        if let Some((&ps, &pc)) = inner.free.floor(&start) {
            if ps + pc > start {
                return Err(StoreError::InvalidArgument("double release".into()));
            }
            if ps + pc == start {
                inner.free.remove(&ps);
                start = ps;
                count += pc;
            }
        }
        // merge the free extent starting exactly at the released end
        if let Some((&ns, &nc)) = inner.free.ceil(&(start + count)) {
            if ns < start + count {
                return Err(StoreError::InvalidArgument("double release".into()));
            }
            if ns == start + count {
                inner.free.remove(&ns);
                count += nc;
            }
        }
        inner.free.insert(start, count);
        Ok(())
    }

    fn available(&self, start: u64, count: u64) -> bool {
        let inner = self.inner.lock();
        if start + count > inner.watermark {
            // untouched space past the watermark is free by definition
            return start >= inner.watermark;
        }
        match inner.free.floor(&start) {
            Some((&fs, &fc)) => fs <= start && start + count <= fs + fc,
            None => false,
        }
    }

    fn occupied(&self, start: u64, count: u64) -> bool {
        let inner = self.inner.lock();
        if start + count > inner.watermark {
            return false;
        }
        // occupied means no byte of the range is on the free list
        if let Some((&fs, &fc)) = inner.free.floor(&(start + count - 1)) {
            if fs + fc > start {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_allocation() {
        let space = ExtentSpace::new();
        let (s0, c0) = space.allocate(100).unwrap();
        let (s1, _) = space.allocate(50).unwrap();
        assert_eq!((s0, c0), (0, 100));
        assert_eq!(s1, 100);
        assert_eq!(space.watermark(), 150);
        assert!(space.occupied(0, 150));
        assert!(!space.available(0, 1));
    }

    #[test]
    fn test_release_and_reuse() {
        let space = ExtentSpace::new();
        let (a, _) = space.allocate(64).unwrap();
        let _ = space.allocate(64).unwrap();
        space.release(a, 64).unwrap();
        assert!(space.available(a, 64));
        // the freed extent is reused before the watermark moves
        let (again, count) = space.allocate(32).unwrap();
        assert_eq!(again, a);
        assert_eq!(count, 32);
        assert_eq!(space.watermark(), 128);
    }

    #[test]
    fn test_adjacent_release_merges() {
        let space = ExtentSpace::new();
        let (a, _) = space.allocate(10).unwrap();
        let (b, _) = space.allocate(10).unwrap();
        let (c, _) = space.allocate(10).unwrap();
        space.release(a, 10).unwrap();
        space.release(c, 10).unwrap();
        space.release(b, 10).unwrap();
        // one merged extent serves a request spanning all three
        let (start, count) = space.allocate(30).unwrap();
        assert_eq!((start, count), (0, 30));
    }

    #[test]
    fn test_double_release_rejected() {
        let space = ExtentSpace::new();
        let (a, _) = space.allocate(16).unwrap();
        space.release(a, 16).unwrap();
        assert!(matches!(
            space.release(a, 16),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
