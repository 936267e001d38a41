//! # Run Orchestrator
//!
//! Purpose: Own the whole run: normalize configuration, split shares across
//! workers, coordinate the lifecycle, fold snapshots, and assemble the
//! result record.
//!
//! ## Design Principles
//! 1. **Exclusive Ownership**: Worker handles, the aggregator, and the
//!    lifecycle clock live here and nowhere else.
//! 2. **Fan-In Channel**: All workers report over one MPSC channel; fold
//!    order is irrelevant because aggregation is commutative.
//! 3. **Bounded Shutdown**: Cooperative stop first, then a hard deadline of
//!    two request timeouts past the run window before giving up on a worker.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use sb_common::{BenchConfig, BenchReport, ConfigError, Meta, WorkerPlan};

use crate::aggregate::Aggregator;
use crate::lifecycle::Lifecycle;
use crate::message::{Control, Event};
use crate::worker;

pub use sb_common::config::MAX_WORKERS;

/// Wait for every worker to boot and report `Ready`.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run-level failures. Request-level failures never surface here; they are
/// counted in the result record instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("worker {worker_id} failed: {message}")]
    Worker { worker_id: usize, message: String },
    #[error("worker {worker_id} did not become ready")]
    NotReady { worker_id: usize },
    #[error("worker thread could not be spawned: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("workers still running past the hard deadline")]
    DeadlineExceeded,
    #[error("a worker exited without reporting a final snapshot")]
    ChannelClosed,
}

/// Runs one benchmark to completion and returns the result record.
///
/// Every spawned worker is joined before this returns, on success and on
/// failure alike; only workers past the hard deadline are abandoned.
pub fn run(config: &BenchConfig) -> Result<BenchReport, RunError> {
    config.validate()?;

    let workers = worker_count(config);
    let plans = WorkerPlan::split(config, workers);
    info!(
        url = %config.target.raw,
        connections = config.connections,
        duration_secs = config.duration.as_secs(),
        workers,
        "starting benchmark"
    );

    let (event_tx, event_rx) = mpsc::channel();
    let mut handles: Vec<WorkerHandle> = Vec::with_capacity(workers);
    for plan in &plans {
        let (control_tx, control_rx) = mpsc::channel();
        let handle = worker::spawn(plan.worker_id, control_rx, event_tx.clone())
            .map_err(RunError::Spawn)?;
        handles.push(WorkerHandle {
            worker_id: plan.worker_id,
            control: control_tx,
            thread: Some(handle),
        });
    }
    // Workers hold the only other senders; drop ours so disconnects surface.
    drop(event_tx);

    let mut crew = Crew { handles };

    // Boot barrier: every worker says Ready before any load starts.
    let mut ready = vec![false; workers];
    for _ in 0..workers {
        match event_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Event::Ready { worker_id }) => ready[worker_id] = true,
            Ok(Event::Error { worker_id, message }) => {
                crew.stop_all();
                return Err(RunError::Worker { worker_id, message });
            }
            Ok(_) | Err(_) => break,
        }
    }
    if let Some(worker_id) = ready.iter().position(|r| !r) {
        crew.stop_all();
        return Err(RunError::NotReady { worker_id });
    }

    let mut lifecycle = Lifecycle::new(config.warmup, config.duration, config.timeout);
    lifecycle.start();
    for (handle, plan) in crew.handles.iter().zip(plans) {
        let _ = handle.control.send(Control::Start(Box::new(plan)));
    }
    let run_started = Instant::now();

    let mut aggregator = Aggregator::new();
    let mut done = 0usize;
    let hard_deadline = match lifecycle.hard_deadline() {
        Some(deadline) => deadline,
        None => run_started + config.total_duration() + config.timeout * 2,
    };

    while done < crew.handles.len() {
        let remaining = hard_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            crew.stop_all();
            return Err(RunError::DeadlineExceeded);
        }
        match event_rx.recv_timeout(remaining) {
            Ok(Event::Metrics(snapshot)) => {
                debug!(
                    worker_id = snapshot.worker_id,
                    requests = snapshot.requests,
                    phase = ?lifecycle.phase(),
                    progress = lifecycle.progress(),
                    "snapshot"
                );
                aggregator.fold(snapshot);
            }
            Ok(Event::Done(snapshot)) => {
                debug!(worker_id = snapshot.worker_id, "worker done");
                aggregator.fold(snapshot);
                done += 1;
            }
            Ok(Event::Error { worker_id, message }) => {
                warn!(worker_id, error = %message, "worker failed, aborting run");
                crew.stop_all();
                return Err(RunError::Worker { worker_id, message });
            }
            Ok(Event::Ready { .. }) => {}
            Err(RecvTimeoutError::Timeout) => {
                crew.stop_all();
                return Err(RunError::DeadlineExceeded);
            }
            Err(RecvTimeoutError::Disconnected) => {
                crew.stop_all();
                return Err(RunError::ChannelClosed);
            }
        }
    }
    let elapsed = run_started.elapsed();
    lifecycle.complete();
    crew.join_all();

    let totals = aggregator.totals();
    info!(
        requests = totals.total,
        failed = totals.failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "benchmark complete"
    );

    Ok(BenchReport {
        url: config.target.raw.clone(),
        method: config.method.as_str().to_string(),
        duration: config.duration.as_secs(),
        connections: config.connections,
        rate: config.rate,
        requests: totals,
        throughput: aggregator.throughput(elapsed),
        latency: aggregator.latency_stats(),
        errors: aggregator.error_tally(),
        timestamp: sb_common::report::utc_timestamp(),
        meta: Meta::collect(
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION"),
        ),
    })
}

/// Workers = min(MAX_WORKERS, CPU count, connections).
pub fn worker_count(config: &BenchConfig) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    MAX_WORKERS
        .min(cpus)
        .min(config.connections as usize)
        .max(1)
}

struct WorkerHandle {
    worker_id: usize,
    control: Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

struct Crew {
    handles: Vec<WorkerHandle>,
}

impl Crew {
    /// Broadcasts `Stop` and joins every worker.
    fn stop_all(&mut self) {
        for handle in &self.handles {
            let _ = handle.control.send(Control::Stop);
        }
        self.join_all();
    }

    fn join_all(&mut self) {
        for handle in &mut self.handles {
            if let Some(thread) = handle.thread.take() {
                if thread.join().is_err() {
                    warn!(worker_id = handle.worker_id, "worker thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_common::Target;

    fn config_with(connections: u32) -> BenchConfig {
        let mut config = BenchConfig::new(Target::parse("http://127.0.0.1:80/").unwrap());
        config.connections = connections;
        config
    }

    #[test]
    fn worker_count_is_capped_by_connections() {
        assert_eq!(worker_count(&config_with(1)), 1);
        assert!(worker_count(&config_with(2)) <= 2);
        assert!(worker_count(&config_with(500)) >= 1);
        assert!(worker_count(&config_with(500)) <= MAX_WORKERS);
    }

    #[test]
    fn invalid_config_fails_before_spawning() {
        let mut config = config_with(0);
        config.connections = 0;
        assert!(matches!(run(&config), Err(RunError::Config(_))));
    }
}
