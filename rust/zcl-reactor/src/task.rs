// zcl-reactor: task run-queues
// A run-queue holds work tasks and child run-queues; a queue is itself
// schedulable in its parent. The empty->non-empty transition attaches a
// queue to its parent (the "new task signal" that lets workers cross core
// boundaries); draining detaches it.

use parking_lot::Mutex;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Scheduling policy of a run-queue, chosen at construction through a
/// [`PolicyTable`] id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RqPolicy {
    Fifo,
    Priority,
}

/// Registry of run-queue policies; ids are small numbers stored by the
/// owner, resolved here rather than through process globals.
pub struct PolicyTable {
    slots: Vec<RqPolicy>,
}

impl PolicyTable {
    /// Table with the built-in policies: 0 = FIFO, 1 = priority.
    pub fn builtin() -> Self {
        Self {
            slots: vec![RqPolicy::Fifo, RqPolicy::Priority],
        }
    }

    pub fn register(&mut self, policy: RqPolicy) -> u8 {
        self.slots.push(policy);
        (self.slots.len() - 1) as u8
    }

    pub fn resolve(&self, id: u8) -> Option<RqPolicy> {
        self.slots.get(id as usize).copied()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A unit of work: priority and quantum plus the closure to run.
pub struct WorkTask {
    pub priority: u8,
    pub quantum: u32,
    seqid: u64,
    enqueued_at: Instant,
    work: Box<dyn FnOnce() + Send>,
}

impl WorkTask {
    pub fn new(priority: u8, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            priority,
            quantum: 1,
            seqid: 0,
            enqueued_at: Instant::now(),
            work: Box::new(work),
        }
    }

    /// Microseconds spent queued.
    pub fn wait_micros(&self) -> u64 {
        self.enqueued_at.elapsed().as_micros() as u64
    }

    pub fn run(self) {
        (self.work)()
    }
}

enum RqItem {
    Work(WorkTask),
    Queue(Arc<TaskRq>),
}

impl RqItem {
    fn priority(&self) -> u8 {
        match self {
            RqItem::Work(t) => t.priority,
            RqItem::Queue(q) => q.priority,
        }
    }
}

struct HeapEntry {
    priority: u8,
    seqid: u64,
    item: RqItem,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seqid == other.seqid
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // max-heap: higher priority first, then lower seqid (older first)
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seqid.cmp(&self.seqid))
    }
}

enum RqStore {
    Fifo(VecDeque<RqItem>),
    Priority(BinaryHeap<HeapEntry>),
}

impl RqStore {
    fn push(&mut self, item: RqItem, seqid: u64) {
        match self {
            RqStore::Fifo(q) => q.push_back(item),
            RqStore::Priority(h) => h.push(HeapEntry {
                priority: item.priority(),
                seqid,
                item,
            }),
        }
    }

    fn pop(&mut self) -> Option<RqItem> {
        match self {
            RqStore::Fifo(q) => q.pop_front(),
            RqStore::Priority(h) => h.pop().map(|e| e.item),
        }
    }

    fn len(&self) -> usize {
        match self {
            RqStore::Fifo(q) => q.len(),
            RqStore::Priority(h) => h.len(),
        }
    }
}

struct RqInner {
    store: RqStore,
    attached: bool,
}

/// Hierarchical run-queue.
pub struct TaskRq {
    priority: u8,
    inner: Mutex<RqInner>,
    parent: Mutex<Weak<TaskRq>>,
    seqid: AtomicU64,
    signal: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl TaskRq {
    pub fn new(policy: RqPolicy, priority: u8) -> Arc<Self> {
        let store = match policy {
            RqPolicy::Fifo => RqStore::Fifo(VecDeque::new()),
            RqPolicy::Priority => RqStore::Priority(BinaryHeap::new()),
        };
        Arc::new(Self {
            priority,
            inner: Mutex::new(RqInner {
                store,
                attached: false,
            }),
            parent: Mutex::new(Weak::new()),
            seqid: AtomicU64::new(0),
            signal: Mutex::new(None),
        })
    }

    /// Callback fired when a parentless queue goes empty -> non-empty.
    pub fn set_signal(&self, signal: Arc<dyn Fn() + Send + Sync>) {
        *self.signal.lock() = Some(signal);
    }

    /// Nest this queue under `parent`; it will attach itself whenever it
    /// has work.
    pub fn set_parent(self: &Arc<Self>, parent: &Arc<TaskRq>) {
        *self.parent.lock() = Arc::downgrade(parent);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_non_empty(self: &Arc<Self>) {
        if let Some(parent) = self.parent.lock().upgrade() {
            parent.add_queue(Arc::clone(self));
        } else if let Some(signal) = self.signal.lock().clone() {
            signal();
        }
    }

    /// Enqueue a work task.
    pub fn add(self: &Arc<Self>, mut task: WorkTask) {
        let became_non_empty = {
            let mut inner = self.inner.lock();
            if task.seqid == 0 {
                task.seqid = self.seqid.fetch_add(1, Ordering::Relaxed) + 1;
            }
            let seqid = task.seqid;
            let was_empty = inner.store.len() == 0;
            inner.store.push(RqItem::Work(task), seqid);
            was_empty
        };
        if became_non_empty {
            self.notify_non_empty();
        }
    }

    /// Enqueue a child queue; duplicates are suppressed by the child's
    /// attached flag.
    pub fn add_queue(self: &Arc<Self>, child: Arc<TaskRq>) {
        {
            let mut child_inner = child.inner.lock();
            if child_inner.attached {
                return;
            }
            child_inner.attached = true;
        }
        let seqid = self.seqid.fetch_add(1, Ordering::Relaxed) + 1;
        let became_non_empty = {
            let mut inner = self.inner.lock();
            let was_empty = inner.store.len() == 0;
            inner.store.push(RqItem::Queue(child), seqid);
            was_empty
        };
        if became_non_empty {
            self.notify_non_empty();
        }
    }

    fn fetch_item(&self) -> Option<RqItem> {
        let mut inner = self.inner.lock();
        let item = inner.store.pop();
        if let Some(RqItem::Queue(child)) = &item {
            child.inner.lock().attached = false;
        }
        item
    }

    /// Detach the next runnable work task, descending into child queues.
    /// A child left non-empty is re-attached so other workers can reach it.
    pub fn fetch_work(self: &Arc<Self>) -> Option<WorkTask> {
        loop {
            match self.fetch_item()? {
                RqItem::Work(task) => return Some(task),
                RqItem::Queue(child) => {
                    let task = child.fetch_work();
                    if !child.is_empty() {
                        self.add_queue(child);
                    }
                    if let Some(task) = task {
                        return Some(task);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fifo_order() {
        let rq = TaskRq::new(RqPolicy::Fifo, 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            rq.add(WorkTask::new(0, move || log.lock().push(i)));
        }
        while let Some(task) = rq.fetch_work() {
            task.run();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_priority_order() {
        let rq = TaskRq::new(RqPolicy::Priority, 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        for (priority, tag) in [(1u8, "low"), (9, "high"), (5, "mid")] {
            let log = Arc::clone(&log);
            rq.add(WorkTask::new(priority, move || log.lock().push(tag)));
        }
        while let Some(task) = rq.fetch_work() {
            task.run();
        }
        assert_eq!(*log.lock(), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_child_queue_bubbles_up() {
        let global = TaskRq::new(RqPolicy::Fifo, 0);
        let local = TaskRq::new(RqPolicy::Fifo, 0);
        local.set_parent(&global);

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            local.add(WorkTask::new(0, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // the local queue attached itself exactly once
        assert_eq!(global.len(), 1);
        // draining through the global queue reaches the local tasks
        while let Some(task) = global.fetch_work() {
            task.run();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(global.is_empty());
        assert!(local.is_empty());
    }

    #[test]
    fn test_new_task_signal_fires_on_transition() {
        let rq = TaskRq::new(RqPolicy::Fifo, 0);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        rq.set_signal(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        rq.add(WorkTask::new(0, || {}));
        rq.add(WorkTask::new(0, || {}));
        // only the empty -> non-empty transition signals
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        while rq.fetch_work().is_some() {}
        rq.add(WorkTask::new(0, || {}));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_policy_table() {
        let mut table = PolicyTable::builtin();
        assert_eq!(table.resolve(0), Some(RqPolicy::Fifo));
        assert_eq!(table.resolve(1), Some(RqPolicy::Priority));
        let id = table.register(RqPolicy::Fifo);
        assert_eq!(table.resolve(id), Some(RqPolicy::Fifo));
        assert_eq!(table.resolve(99), None);
    }
}
