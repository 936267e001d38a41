//! # Worker Runtime
//!
//! Purpose: Host one isolated load-generating domain on its own OS thread.
//!
//! ## Design Principles
//! 1. **Isolation**: All hot state (histogram, rate limiter, connections)
//!    lives behind `Rc<RefCell>` on a current-thread runtime; the only way
//!    in or out is a typed message.
//! 2. **Closed Loop**: Each connection share runs one cooperative task that
//!    keeps exactly one request in flight.
//! 3. **Drain Snapshots**: Metrics are taken, not copied, so the sum of all
//!    emitted snapshots equals the run totals.
//! 4. **Cooperative Stop**: A stop only takes effect at the next quiescence
//!    point; in-flight requests are never aborted.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::task::LocalSet;
use tracing::{debug, warn};

use sb_client::{H2Channel, HttpClient, RequestError, RequestTemplate, Response};
use sb_common::{is_success_status, WorkerPlan};

use crate::histogram::Histogram;
use crate::message::{Control, Event, LatencyData, MetricsSnapshot};
use crate::limiter::{acquire, TokenBucket};

/// Interval between periodic metrics snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns a worker thread that waits for `Start` and reports over `events`.
pub fn spawn(
    worker_id: usize,
    control: Receiver<Control>,
    events: Sender<Event>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("sb-worker-{worker_id}"))
        .spawn(move || run_thread(worker_id, control, events))
}

fn run_thread(worker_id: usize, control: Receiver<Control>, events: Sender<Event>) {
    if events.send(Event::Ready { worker_id }).is_err() {
        return;
    }

    let plan = match control.recv() {
        Ok(Control::Start(plan)) => *plan,
        // Stopped before starting, or the orchestrator went away.
        Ok(Control::Stop) | Err(_) => return,
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| run_worker(plan, &control, &events)));
    match outcome {
        Ok(Ok(final_snapshot)) => {
            let _ = events.send(Event::Done(final_snapshot));
        }
        Ok(Err(message)) => {
            let _ = events.send(Event::Error { worker_id, message });
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            let _ = events.send(Event::Error { worker_id, message });
        }
    }
}

fn run_worker(
    plan: WorkerPlan,
    control: &Receiver<Control>,
    events: &Sender<Event>,
) -> Result<MetricsSnapshot, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("runtime start failed: {err}"))?;
    let local = LocalSet::new();
    runtime.block_on(local.run_until(drive(plan, control, events)))
}

/// Runs the request loop tasks plus the snapshot ticker to completion and
/// returns the final drained snapshot.
async fn drive(
    plan: WorkerPlan,
    control: &Receiver<Control>,
    events: &Sender<Event>,
) -> Result<MetricsSnapshot, String> {
    let worker_id = plan.worker_id;
    let config = &plan.config;

    let template = Rc::new(RequestTemplate::build(config));
    let metrics = Rc::new(RefCell::new(WorkerMetrics::new()));
    let stop = Rc::new(Cell::new(false));
    let limiter = plan
        .rate
        .map(|rate| Rc::new(RefCell::new(TokenBucket::new(rate, config.ramp_up))));
    let channel = config.http2.then(H2Channel::new);

    let started = Instant::now();
    let deadline = started + config.total_duration();

    debug!(
        worker_id,
        connections = plan.connections,
        rate = ?plan.rate,
        http2 = config.http2,
        "worker starting"
    );

    let mut tasks = Vec::with_capacity(plan.connections as usize);
    for task_idx in 0..plan.connections {
        // Connection starts spread linearly across the ramp-up window.
        let start_delay = if config.ramp_up.is_zero() {
            Duration::ZERO
        } else {
            config.ramp_up.mul_f64(task_idx as f64 / plan.connections as f64)
        };
        let client = HttpClient::new(config, channel.as_ref());

        tasks.push(tokio::task::spawn_local(request_loop(
            client,
            Rc::clone(&template),
            Rc::clone(&metrics),
            limiter.clone(),
            Rc::clone(&stop),
            deadline,
            start_delay,
        )));
    }

    // Snapshot ticker; doubles as the stop-signal poll point.
    loop {
        let now = Instant::now();
        if now >= deadline || stop.get() {
            break;
        }
        let next = (now + SNAPSHOT_INTERVAL).min(deadline);
        tokio::time::sleep_until(next.into()).await;

        match control.try_recv() {
            Ok(Control::Stop) | Err(TryRecvError::Disconnected) => stop.set(true),
            Ok(Control::Start(_)) | Err(TryRecvError::Empty) => {}
        }

        let snapshot = metrics.borrow_mut().drain(worker_id);
        if events.send(Event::Metrics(snapshot)).is_err() {
            stop.set(true);
        }
    }
    stop.set(true);

    // Let every loop finish its in-flight request.
    for task in tasks {
        if let Err(err) = task.await {
            warn!(worker_id, error = %err, "request loop aborted");
        }
    }

    debug!(worker_id, "worker draining");
    let final_snapshot = metrics.borrow_mut().drain(worker_id);
    Ok(final_snapshot)
}

/// Closed-loop driver for one connection share.
async fn request_loop(
    mut client: HttpClient,
    template: Rc<RequestTemplate>,
    metrics: Rc<RefCell<WorkerMetrics>>,
    limiter: Option<Rc<RefCell<TokenBucket>>>,
    stop: Rc<Cell<bool>>,
    deadline: Instant,
    start_delay: Duration,
) {
    if !start_delay.is_zero() {
        tokio::time::sleep(start_delay).await;
    }

    loop {
        if stop.get() || Instant::now() >= deadline {
            break;
        }
        if let Some(limiter) = &limiter {
            acquire(limiter).await;
            // The token wait may have crossed the deadline.
            if stop.get() || Instant::now() >= deadline {
                break;
            }
        }

        match client.execute(&template).await {
            Ok(response) => metrics.borrow_mut().on_response(&response),
            Err(error) => metrics.borrow_mut().on_error(&error),
        }
    }
}

/// Per-worker metrics accumulation, drained into snapshots.
pub struct WorkerMetrics {
    requests: u64,
    successes: u64,
    failures: u64,
    bytes: u64,
    timeouts: u64,
    connection_errors: u64,
    status_failures: std::collections::HashMap<u16, u64>,
    histogram: Histogram,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        WorkerMetrics {
            requests: 0,
            successes: 0,
            failures: 0,
            bytes: 0,
            timeouts: 0,
            connection_errors: 0,
            status_failures: std::collections::HashMap::new(),
            histogram: Histogram::new(),
        }
    }

    /// Records a completed exchange. The latency is recorded for every
    /// response that arrived intact, success or not.
    pub fn on_response(&mut self, response: &Response) {
        self.requests += 1;
        self.bytes += response.bytes;
        self.histogram.record(response.latency_us);
        if is_success_status(response.status) {
            self.successes += 1;
        } else {
            self.failures += 1;
            *self.status_failures.entry(response.status).or_insert(0) += 1;
        }
    }

    /// Records a failed exchange: a timeout when the timer tripped,
    /// otherwise a connection error.
    pub fn on_error(&mut self, error: &RequestError) {
        self.requests += 1;
        self.failures += 1;
        if error.is_timeout() {
            self.timeouts += 1;
        } else {
            self.connection_errors += 1;
        }
    }

    /// Takes everything accumulated since the previous drain.
    pub fn drain(&mut self, worker_id: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            worker_id,
            requests: std::mem::take(&mut self.requests),
            successes: std::mem::take(&mut self.successes),
            failures: std::mem::take(&mut self.failures),
            bytes: std::mem::take(&mut self.bytes),
            timeouts: std::mem::take(&mut self.timeouts),
            connection_errors: std::mem::take(&mut self.connection_errors),
            status_failures: std::mem::take(&mut self.status_failures),
            latency: LatencyData::Delta(self.histogram.take()),
        }
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, latency_us: u64) -> Response {
        Response {
            status,
            bytes: 64,
            latency_us,
        }
    }

    #[test]
    fn success_set_drives_the_split() {
        let mut metrics = WorkerMetrics::new();
        for status in sb_common::SUCCESS_STATUSES {
            metrics.on_response(&response(status, 1_000));
        }
        metrics.on_response(&response(404, 1_000));
        metrics.on_response(&response(500, 1_000));

        assert_eq!(metrics.requests, 9);
        assert_eq!(metrics.successes, 7);
        assert_eq!(metrics.failures, 2);
        assert_eq!(metrics.status_failures.get(&404), Some(&1));
        assert_eq!(metrics.status_failures.get(&500), Some(&1));
    }

    #[test]
    fn errors_split_into_timeouts_and_connections() {
        let mut metrics = WorkerMetrics::new();
        metrics.on_error(&RequestError::Timeout);
        metrics.on_error(&RequestError::Connect(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        metrics.on_error(&RequestError::Protocol("bad framing"));

        assert_eq!(metrics.requests, 3);
        assert_eq!(metrics.failures, 3);
        assert_eq!(metrics.timeouts, 1);
        // Protocol failures count as connection errors in the tally.
        assert_eq!(metrics.connection_errors, 2);
    }

    #[test]
    fn drain_resets_and_sums_to_totals() {
        let mut metrics = WorkerMetrics::new();
        metrics.on_response(&response(200, 2_000));
        metrics.on_response(&response(500, 3_000));

        let first = metrics.drain(7);
        assert_eq!(first.worker_id, 7);
        assert_eq!(first.requests, 2);

        metrics.on_response(&response(200, 1_000));
        let second = metrics.drain(7);
        assert_eq!(second.requests, 1);
        assert_eq!(first.requests + second.requests, 3);

        let third = metrics.drain(7);
        assert_eq!(third.requests, 0);
        match third.latency {
            LatencyData::Delta(hist) => assert!(hist.is_empty()),
            LatencyData::Samples(_) => panic!("workers emit deltas"),
        }
    }
}
