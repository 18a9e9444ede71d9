// zcl-reactor: per-core event loops and task scheduling

//! # zcl-reactor
//!
//! One OS thread per core, each running a current-thread tokio runtime with
//! a `LocalSet`. I/O entities (connections, timers, user events) are local
//! tasks registered in a per-core entity table; CPU-bound work goes through
//! hierarchical task run-queues: every core owns a local queue that bubbles
//! up into the reactor's global queue when it has work, which is how work
//! crosses core boundaries.
//!
//! The loop alternates between draining ready I/O and one bounded `exec`
//! pass over the run-queue; pass and per-task latencies feed fixed-bound
//! histograms.

pub mod eloop;
pub mod stats;
pub mod task;

pub use eloop::{Reactor, ReactorConfig, ReactorHandle, WorkerCtx};
pub use stats::{LoopStats, LoopStatsSnapshot};
pub use task::{PolicyTable, RqPolicy, TaskRq, WorkTask};
