// zcl-reactor: event-loop latency accounting

use serde::Serialize;
use zcl_core::{Histogram, HistogramSnapshot};

/// Latency histograms for one reactor: exec-pass duration, individual task
/// execution time, and the time tasks spend queued.
#[derive(Debug, Default)]
pub struct LoopStats {
    pub exec_pass: Histogram,
    pub task_exec: Histogram,
    pub rq_wait: Histogram,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            exec_pass: self.exec_pass.snapshot(),
            task_exec: self.task_exec.snapshot(),
            rq_wait: self.rq_wait.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopStatsSnapshot {
    pub exec_pass: HistogramSnapshot,
    pub task_exec: HistogramSnapshot,
    pub rq_wait: HistogramSnapshot,
}
