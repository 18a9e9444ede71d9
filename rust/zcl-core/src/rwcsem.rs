// zcl-core: read/write/commit/lock semaphore
// One AtomicU32: 29 bits of reader count, then WRITE, COMMIT, LOCK flags.
// All acquire paths are CAS loops; none of them park a thread.

use std::sync::atomic::{AtomicU32, Ordering};

const READERS_MASK: u32 = 0x1fff_ffff;
const WRITE_FLAG: u32 = 1 << 29;
const COMMIT_FLAG: u32 = 1 << 30;
const LOCK_FLAG: u32 = 1 << 31;

/// readers + write bits (everything a reader CAS is allowed to observe)
const RW_MASK: u32 = READERS_MASK | WRITE_FLAG;
/// commit + write bits (what blocks a new writer)
const CW_MASK: u32 = COMMIT_FLAG | WRITE_FLAG;
/// lock + commit bits (survive a write release)
const LC_MASK: u32 = LOCK_FLAG | COMMIT_FLAG;

/// Access mode requested on a [`RwCSem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
    Commit,
    Lock,
}

/// Read/write/commit/lock semaphore.
///
/// The intended protocol: readers and a single writer may coexist; to run
/// the commit phase of a transaction, set the COMMIT flag (new readers are
/// turned away), wait for the reader count to drain to zero, then acquire
/// commit. LOCK is an exclusive long-term latch for schema-level work.
/// The encoding makes writer/committer overlap and reader/committer overlap
/// unrepresentable.
#[derive(Debug, Default)]
pub struct RwCSem {
    state: AtomicU32,
}

impl RwCSem {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    #[inline]
    pub fn readers(&self) -> u32 {
        self.state() & READERS_MASK
    }

    /// Acquire shared read access. Fails only while the COMMIT flag is set;
    /// spins through transient contention (including a pending LOCK flag,
    /// which drains readers by refusing the CAS until it clears).
    pub fn try_acquire_read(&self) -> bool {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            if cur & COMMIT_FLAG != 0 {
                return false;
            }
            let exp = cur & RW_MASK;
            match self
                .state
                .compare_exchange_weak(exp, exp + 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => {
                    cur = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Release shared read access, returning the residual state word.
    pub fn release_read(&self) -> u32 {
        let prev = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev & READERS_MASK > 0, "read release without readers");
        prev - 1
    }

    /// Acquire the single writer slot. Fails while a writer or committer is
    /// active; readers do not block a writer.
    pub fn try_acquire_write(&self) -> bool {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            if cur & CW_MASK != 0 {
                return false;
            }
            let exp = cur & READERS_MASK;
            match self.state.compare_exchange_weak(
                exp,
                exp | WRITE_FLAG,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    cur = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Release the writer slot. COMMIT, LOCK and the reader count are
    /// untouched.
    pub fn release_write(&self) -> u32 {
        self.state.fetch_and(!WRITE_FLAG, Ordering::AcqRel) & !WRITE_FLAG
    }

    /// Flag a pending commit: future read acquisitions fail until the
    /// commit completes.
    pub fn set_commit_flag(&self) {
        self.state.fetch_or(COMMIT_FLAG, Ordering::AcqRel);
    }

    pub fn has_commit_flag(&self) -> bool {
        self.state() & COMMIT_FLAG != 0
    }

    /// Acquire the commit phase: succeeds only when the state is exactly
    /// COMMIT (flag set, readers drained, no writer).
    pub fn try_acquire_commit(&self) -> bool {
        self.state
            .compare_exchange(
                COMMIT_FLAG,
                COMMIT_FLAG | WRITE_FLAG,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// End the commit phase; only a pending LOCK flag survives.
    pub fn release_commit(&self) -> u32 {
        self.state.fetch_and(LOCK_FLAG, Ordering::AcqRel) & LOCK_FLAG
    }

    /// Flag a pending exclusive latch.
    pub fn set_lock_flag(&self) {
        self.state.fetch_or(LOCK_FLAG, Ordering::AcqRel);
    }

    pub fn has_lock_flag(&self) -> bool {
        self.state() & LOCK_FLAG != 0
    }

    /// Acquire the exclusive latch: succeeds only when the state is exactly
    /// LOCK (flag set, everything else drained).
    pub fn try_acquire_lock(&self) -> bool {
        self.state
            .compare_exchange(
                LOCK_FLAG,
                LOCK_FLAG | WRITE_FLAG,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Drop the exclusive latch entirely.
    pub fn release_lock(&self) {
        self.state.store(0, Ordering::Release);
    }

    /// Downgrade/upgrade the currently-held mode without a release window.
    /// Supported: Write->Read (fails while COMMIT is pending) and
    /// Write->Commit (succeeds iff the holder is the pending committer).
    pub fn try_switch(&self, current: LockMode, next: LockMode) -> bool {
        if current != LockMode::Write {
            return false;
        }
        match next {
            LockMode::Read => {
                let mut cur = self.state.load(Ordering::Relaxed);
                loop {
                    if cur & COMMIT_FLAG != 0 {
                        return false;
                    }
                    let exp = cur & RW_MASK;
                    let new = (exp & !WRITE_FLAG) + 1;
                    match self.state.compare_exchange_weak(
                        exp,
                        new,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return true,
                        Err(actual) => {
                            cur = actual;
                            std::hint::spin_loop();
                        }
                    }
                }
            }
            LockMode::Commit => self.state() == (COMMIT_FLAG | WRITE_FLAG),
            _ => false,
        }
    }

    pub fn try_acquire(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.try_acquire_read(),
            LockMode::Write => self.try_acquire_write(),
            LockMode::Commit => self.try_acquire_commit(),
            LockMode::Lock => self.try_acquire_lock(),
        }
    }

    pub fn release(&self, mode: LockMode) {
        match mode {
            LockMode::Read => {
                self.release_read();
            }
            LockMode::Write => {
                self.release_write();
            }
            LockMode::Commit => {
                self.release_commit();
            }
            LockMode::Lock => self.release_lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_readers_and_writer_coexist() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire_read());
        assert!(sem.try_acquire_read());
        assert!(sem.try_acquire_write());
        assert_eq!(sem.readers(), 2);
        // second writer refused
        assert!(!sem.try_acquire_write());
        sem.release_write();
        assert!(sem.try_acquire_write());
        sem.release_write();
        sem.release_read();
        sem.release_read();
        assert_eq!(sem.state(), 0);
    }

    #[test]
    fn test_commit_drains_readers() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire_read());
        sem.set_commit_flag();
        // new readers are turned away while the flag is set
        assert!(!sem.try_acquire_read());
        // commit cannot start until readers drain
        assert!(!sem.try_acquire_commit());
        sem.release_read();
        assert!(sem.try_acquire_commit());
        // nobody else gets in during the commit phase
        assert!(!sem.try_acquire_read());
        assert!(!sem.try_acquire_write());
        sem.release_commit();
        assert_eq!(sem.state(), 0);
        assert!(sem.try_acquire_read());
        sem.release_read();
    }

    #[test]
    fn test_lock_is_exclusive() {
        let sem = RwCSem::new();
        sem.set_lock_flag();
        assert!(sem.try_acquire_lock());
        assert!(!sem.try_acquire_write());
        assert!(!sem.try_acquire_commit());
        sem.release_lock();
        assert_eq!(sem.state(), 0);
    }

    #[test]
    fn test_write_to_read_switch() {
        let sem = RwCSem::new();
        assert!(sem.try_acquire_write());
        assert!(sem.try_switch(LockMode::Write, LockMode::Read));
        assert_eq!(sem.readers(), 1);
        assert!(sem.try_acquire_write());
        sem.release_write();
        sem.release_read();
        assert_eq!(sem.state(), 0);
    }

    #[test]
    fn test_concurrent_invariants() {
        // WRITE held => no second WRITE; COMMIT acquired => no readers.
        let sem = Arc::new(RwCSem::new());
        let writers = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sem = Arc::clone(&sem);
            let writers = Arc::clone(&writers);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    if sem.try_acquire_write() {
                        let w = writers.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(w, 0, "two writers inside the critical section");
                        writers.fetch_sub(1, Ordering::SeqCst);
                        sem.release_write();
                    }
                    if sem.try_acquire_read() {
                        assert!(!sem.has_commit_flag() || sem.readers() > 0);
                        sem.release_read();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sem.state(), 0);
    }
}
