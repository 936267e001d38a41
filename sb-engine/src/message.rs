//! # Coordinator/Worker Messages
//!
//! Purpose: The closed message protocol between the orchestrator and its
//! workers. Two tagged sum types keep handler dispatch exhaustive; every
//! payload moves by value so no mutable state crosses a worker boundary.

use std::collections::HashMap;

use sb_common::WorkerPlan;

use crate::histogram::Histogram;

/// Orchestrator to worker.
#[derive(Debug)]
pub enum Control {
    /// Begin the run with this worker's share of the load.
    Start(Box<WorkerPlan>),
    /// Finish in-flight work and report the final snapshot.
    Stop,
}

/// Worker to orchestrator, over the shared MPSC channel.
#[derive(Debug)]
pub enum Event {
    /// Worker booted and is waiting for `Start`.
    Ready { worker_id: usize },
    /// Periodic drain of metrics accumulated since the previous snapshot.
    Metrics(MetricsSnapshot),
    /// Final drain; the worker exits after sending this.
    Done(MetricsSnapshot),
    /// Unrecoverable worker failure; aborts the run.
    Error { worker_id: usize, message: String },
}

/// Atomic copy of a worker's metrics state, drained on emission so the sum
/// of all snapshots equals the run totals exactly.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub worker_id: usize,
    /// Completed request cycles, including failures.
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Response bytes received.
    pub bytes: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    /// Failed responses by status code.
    pub status_failures: HashMap<u16, u64>,
    /// Latencies recorded since the previous snapshot.
    pub latency: LatencyData,
}

/// Latency payload of a snapshot.
///
/// Workers send a histogram delta (fixed-size transfer, no per-sample
/// allocation); the raw form exists for callers that feed individual
/// samples, and the aggregator accepts both.
#[derive(Debug, Clone)]
pub enum LatencyData {
    Delta(Histogram),
    Samples(Vec<u64>),
}

impl MetricsSnapshot {
    /// An empty snapshot for `worker_id`.
    pub fn empty(worker_id: usize) -> Self {
        MetricsSnapshot {
            worker_id,
            requests: 0,
            successes: 0,
            failures: 0,
            bytes: 0,
            timeouts: 0,
            connection_errors: 0,
            status_failures: HashMap::new(),
            latency: LatencyData::Delta(Histogram::new()),
        }
    }
}
