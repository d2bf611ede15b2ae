//! Batch engine: coordination, audit trail, and metrics.

pub mod audit;
pub mod coordinator;
pub mod error;
pub mod metrics;

pub use audit::{AuditRecorder, AuditSink, JsonlSink, MemorySink};
pub use coordinator::{BatchCoordinator, CancellationToken, ProgressHook};
pub use error::EngineError;
pub use metrics::{EngineMetrics, MetricsSnapshot};
