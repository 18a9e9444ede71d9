// zcl-reactor: per-core event loop
// Every worker thread owns a current-thread tokio runtime plus a LocalSet.
// Entities (connection drivers, timers, user-event waiters) are local tasks
// tracked in a per-core table keyed by entity id; removing an entity aborts
// its task, so a callback is never re-entered concurrently on the same
// core and close-time cleanup runs exactly once, in the entity's drop path.

use crate::stats::LoopStats;
use crate::task::{RqPolicy, TaskRq, WorkTask};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::LocalSet;
use tracing::{debug, warn};
use zcl_collections::OpenHashMap;

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Worker thread count; defaults to the machine's core count.
    pub cores: usize,
    /// Wall-clock budget of one exec pass over the run-queue.
    pub exec_quantum: Duration,
    /// Upper bound on how long a worker parks waiting for I/O or wake-ups.
    pub park_timeout: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            cores: num_cpus::get(),
            exec_quantum: Duration::from_millis(2),
            park_timeout: Duration::from_millis(50),
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    notify: Arc<Notify>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Per-core context, reachable from code running on a worker thread via
/// [`WorkerCtx::current`].
pub struct WorkerCtx {
    pub core: usize,
    /// The core's local run-queue (parented into the reactor's global one).
    pub rq: Arc<TaskRq>,
    notify: Arc<Notify>,
    entities: RefCell<OpenHashMap<u64, tokio::task::JoinHandle<()>>>,
    next_entity: Cell<u64>,
}

thread_local! {
    static CURRENT_WORKER: RefCell<Option<Rc<WorkerCtx>>> = const { RefCell::new(None) };
}

impl WorkerCtx {
    /// The context of the worker thread we are running on, if any.
    pub fn current() -> Option<Rc<WorkerCtx>> {
        CURRENT_WORKER.with(|ctx| ctx.borrow().clone())
    }

    /// Register a local future as an entity; it runs on this core until it
    /// completes or the entity is removed.
    pub fn add_entity<F>(&self, fut: F) -> u64
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.next_entity.get();
        self.next_entity.set(id + 1);
        let handle = tokio::task::spawn_local(fut);
        self.entities.borrow_mut().insert(id, handle);
        id
    }

    /// Abort an entity's task. Idempotent; the entity's drop path is its
    /// close callback and runs once.
    pub fn remove_entity(&self, id: u64) {
        if let Some(handle) = self.entities.borrow_mut().remove(&id) {
            handle.abort();
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.borrow().len()
    }

    /// Wake this core's loop (the user-event primitive).
    pub fn user_event(&self) {
        self.notify.notify_one();
    }
}

/// Multi-core reactor: worker threads, a global run-queue, and cross-core
/// wake-ups.
pub struct Reactor {
    workers: Vec<Worker>,
    global_rq: Arc<TaskRq>,
    stats: Arc<LoopStats>,
    shutdown: Arc<AtomicBool>,
}

/// Cheap cloneable handle for placing work on reactor cores; outlives
/// borrows of the [`Reactor`] itself (entities hold it).
#[derive(Clone)]
pub struct ReactorHandle {
    jobs: Vec<mpsc::UnboundedSender<Job>>,
    notifies: Vec<Arc<Notify>>,
    global_rq: Arc<TaskRq>,
    stats: Arc<LoopStats>,
}

impl ReactorHandle {
    pub fn cores(&self) -> usize {
        self.jobs.len()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Submit a task to the global run-queue; any core may pick it up.
    pub fn submit(&self, task: WorkTask) {
        self.global_rq.add(task);
    }

    /// Run `f` on the given core's thread, inside its LocalSet context.
    pub fn spawn_on(&self, core: usize, f: impl FnOnce() + Send + 'static) {
        let core = core % self.jobs.len();
        if self.jobs[core].send(Box::new(f)).is_err() {
            warn!(core, "spawn_on after reactor shutdown");
            return;
        }
        self.notifies[core].notify_one();
    }

    /// Wake a specific core (cross-core user event).
    pub fn user_event(&self, core: usize) {
        self.notifies[core % self.notifies.len()].notify_one();
    }
}

impl Reactor {
    pub fn start(config: ReactorConfig) -> Self {
        let cores = config.cores.max(1);
        let global_rq = TaskRq::new(RqPolicy::Fifo, 0);
        let stats = Arc::new(LoopStats::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut notifies = Vec::with_capacity(cores);
        for _ in 0..cores {
            notifies.push(Arc::new(Notify::new()));
        }
        {
            // the global queue's new-task signal wakes every parked core
            let notifies = notifies.clone();
            global_rq.set_signal(Arc::new(move || {
                for notify in &notifies {
                    notify.notify_one();
                }
            }));
        }

        let workers = (0..cores)
            .map(|core| {
                let (tx, rx) = mpsc::unbounded_channel();
                let notify = Arc::clone(&notifies[core]);
                let thread = {
                    let notify = Arc::clone(&notify);
                    let global_rq = Arc::clone(&global_rq);
                    let stats = Arc::clone(&stats);
                    let shutdown = Arc::clone(&shutdown);
                    let config = config.clone();
                    std::thread::Builder::new()
                        .name(format!("zcl-worker-{core}"))
                        .spawn(move || {
                            worker_main(core, config, rx, notify, global_rq, stats, shutdown)
                        })
                        .expect("spawn worker thread")
                };
                Worker {
                    jobs: tx,
                    notify,
                    thread: Some(thread),
                }
            })
            .collect();

        Self {
            workers,
            global_rq,
            stats,
            shutdown,
        }
    }

    pub fn cores(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// A cloneable handle usable from entities and other threads.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            jobs: self.workers.iter().map(|w| w.jobs.clone()).collect(),
            notifies: self.workers.iter().map(|w| Arc::clone(&w.notify)).collect(),
            global_rq: Arc::clone(&self.global_rq),
            stats: Arc::clone(&self.stats),
        }
    }

    /// The reactor-wide run-queue; core-local queues parent into it.
    pub fn global_rq(&self) -> &Arc<TaskRq> {
        &self.global_rq
    }

    /// Submit a task to the global run-queue; any core may pick it up.
    pub fn submit(&self, task: WorkTask) {
        self.global_rq.add(task);
    }

    /// Run `f` on the given core's thread, inside its LocalSet context;
    /// `f` may register entities via [`WorkerCtx::current`].
    pub fn spawn_on(&self, core: usize, f: impl FnOnce() + Send + 'static) {
        let worker = &self.workers[core % self.workers.len()];
        if worker.jobs.send(Box::new(f)).is_err() {
            warn!(core, "spawn_on after reactor shutdown");
            return;
        }
        worker.notify.notify_one();
    }

    /// Fire a periodic callback on `core` every `period`. The timer is an
    /// entity of that core; its callback runs inline on the owning thread.
    pub fn schedule_timer(
        &self,
        core: usize,
        period: Duration,
        f: impl FnMut() + Send + 'static,
    ) {
        self.spawn_on(core, move || {
            let ctx = WorkerCtx::current().expect("timer outside worker");
            let mut f = f;
            ctx.add_entity(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    f();
                }
            });
        });
    }

    /// Wake a specific core (cross-core user event).
    pub fn user_event(&self, core: usize) {
        self.workers[core % self.workers.len()].notify.notify_one();
    }

    /// Stop every worker and join the threads.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in &self.workers {
            worker.notify.notify_one();
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!("worker thread panicked during shutdown");
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    core: usize,
    config: ReactorConfig,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    notify: Arc<Notify>,
    global_rq: Arc<TaskRq>,
    stats: Arc<LoopStats>,
    shutdown: Arc<AtomicBool>,
) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build worker runtime");
    let local = LocalSet::new();

    let local_rq = TaskRq::new(RqPolicy::Fifo, 0);
    local_rq.set_parent(&global_rq);

    let ctx = Rc::new(WorkerCtx {
        core,
        rq: Arc::clone(&local_rq),
        notify: Arc::clone(&notify),
        entities: RefCell::new(OpenHashMap::new()),
        next_entity: Cell::new(1),
    });

    local.block_on(&rt, async {
        CURRENT_WORKER.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&ctx)));
        debug!(core, "worker loop running");
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            // run registration jobs sent to this core
            while let Ok(job) = jobs.try_recv() {
                job();
            }

            // one exec pass over the run-queue, bounded by the quantum
            let pass_start = Instant::now();
            let mut ran_any = false;
            while let Some(task) = global_rq.fetch_work() {
                ran_any = true;
                stats.rq_wait.add(task.wait_micros());
                let t0 = Instant::now();
                task.run();
                stats.task_exec.add(t0.elapsed().as_micros() as u64);
                if pass_start.elapsed() >= config.exec_quantum {
                    break;
                }
            }
            if ran_any {
                stats.exec_pass.add(pass_start.elapsed().as_micros() as u64);
            }

            // park: ready I/O on this core's LocalSet keeps running while
            // we wait for a wake-up or the park timeout
            if global_rq.is_empty() {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(config.park_timeout) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
        CURRENT_WORKER.with(|slot| *slot.borrow_mut() = None);
        debug!(core, "worker loop stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn small_reactor(cores: usize) -> Reactor {
        Reactor::start(ReactorConfig {
            cores,
            ..ReactorConfig::default()
        })
    }

    #[test]
    fn test_submit_runs_on_some_core() {
        let reactor = small_reactor(2);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let ran = Arc::clone(&ran);
            reactor.submit(WorkTask::new(0, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while ran.load(Ordering::SeqCst) < 16 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 16);
        reactor.shutdown();
    }

    #[test]
    fn test_spawn_on_has_worker_context() {
        let reactor = small_reactor(2);
        let seen_core = Arc::new(AtomicUsize::new(usize::MAX));
        {
            let seen_core = Arc::clone(&seen_core);
            reactor.spawn_on(1, move || {
                let ctx = WorkerCtx::current().expect("worker context");
                seen_core.store(ctx.core, Ordering::SeqCst);
            });
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen_core.load(Ordering::SeqCst) == usize::MAX && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen_core.load(Ordering::SeqCst), 1);
        reactor.shutdown();
    }

    #[test]
    fn test_timer_fires_repeatedly() {
        let reactor = small_reactor(1);
        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let ticks = Arc::clone(&ticks);
            reactor.schedule_timer(0, Duration::from_millis(10), move || {
                ticks.fetch_add(1, Ordering::SeqCst);
            });
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 3);
        reactor.shutdown();
    }

    #[test]
    fn test_entity_remove_aborts() {
        let reactor = small_reactor(1);
        let alive = Arc::new(AtomicUsize::new(0));
        {
            let alive = Arc::clone(&alive);
            reactor.spawn_on(0, move || {
                let ctx = WorkerCtx::current().expect("worker context");
                let id = ctx.add_entity(async move {
                    loop {
                        alive.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                });
                let ctx2 = WorkerCtx::current().expect("worker context");
                // remove immediately after a short grace period
                ctx2.add_entity(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    if let Some(ctx) = WorkerCtx::current() {
                        ctx.remove_entity(id);
                    }
                });
            });
        }
        std::thread::sleep(Duration::from_millis(120));
        let frozen = alive.load(Ordering::SeqCst);
        assert!(frozen > 0);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(alive.load(Ordering::SeqCst), frozen);
        reactor.shutdown();
    }
}
