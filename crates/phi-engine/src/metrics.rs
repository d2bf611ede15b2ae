//! Engine counters exposed for external scraping.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counters shared across workers. Cheap to update from the
/// hot path; read consistency is per-counter, which is enough for
/// scraping.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    records_processed: AtomicU64,
    records_rejected: AtomicU64,
    redacted_fields: AtomicU64,
    encryption_failures: AtomicU64,
    audit_write_failures: AtomicU64,
    last_batch_duration_ms: AtomicU64,
}

impl EngineMetrics {
    pub fn inc_records_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_redacted_fields(&self, count: u64) {
        self.redacted_fields.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_encryption_failures(&self) {
        self.encryption_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_audit_write_failures(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_batch_duration_ms(&self, ms: u64) {
        self.last_batch_duration_ms.store(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            redacted_fields: self.redacted_fields.load(Ordering::Relaxed),
            encryption_failures: self.encryption_failures.load(Ordering::Relaxed),
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
            last_batch_duration_ms: self.last_batch_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub records_rejected: u64,
    pub redacted_fields: u64,
    pub encryption_failures: u64,
    pub audit_write_failures: u64,
    pub last_batch_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = EngineMetrics::default();
        metrics.inc_records_processed();
        metrics.inc_records_processed();
        metrics.inc_records_rejected();
        metrics.add_redacted_fields(3);
        metrics.set_last_batch_duration_ms(42);

        let snap = metrics.snapshot();
        assert_eq!(snap.records_processed, 2);
        assert_eq!(snap.records_rejected, 1);
        assert_eq!(snap.redacted_fields, 3);
        assert_eq!(snap.encryption_failures, 0);
        assert_eq!(snap.last_batch_duration_ms, 42);
    }
}
