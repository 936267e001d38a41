// sb-engine - Load-generation engine for swiftbench
//
// OS-thread workers drive closed request loops against one origin; the
// orchestrator splits the load, folds their snapshots, and produces the
// result record

pub mod aggregate;
pub mod histogram;
pub mod lifecycle;
pub mod limiter;
pub mod message;
pub mod orchestrator;
pub mod worker;

// Re-export for convenience
pub use aggregate::Aggregator;
pub use histogram::Histogram;
pub use lifecycle::{Lifecycle, Phase};
pub use limiter::TokenBucket;
pub use message::{Control, Event, LatencyData, MetricsSnapshot};
pub use orchestrator::{run, worker_count, RunError};
