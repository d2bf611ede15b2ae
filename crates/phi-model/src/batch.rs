//! Batch invocation and result types exchanged with the external
//! scheduler collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, Role};
use crate::record::Record;

/// One batch submission: records sharing a schema version and role
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_id: BatchId,
    pub schema_version: String,
    pub role: Role,
    pub records: Vec<Record>,
}

/// Terminal state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Every record accepted.
    Completed,
    /// Mixed accept/reject; resubmission is the scheduler's call.
    PartiallyFailed,
    /// Fatal escalation (audit sink unavailable, or key resolution failed
    /// for every record).
    Failed,
}

/// Aggregated counters for one batch run, finalized only after every
/// record reached a terminal per-record state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub state: BatchState,
    pub total_records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub encryption_failures: usize,
    pub redacted_field_count: usize,
    /// Records never dispatched (cancellation or fatal escalation).
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// A processed batch: the result summary plus the transformed records
/// handed to the external persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedBatch {
    pub result: BatchResult,
    pub records: Vec<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_round_trips() {
        let result = BatchResult {
            batch_id: BatchId::new("b-1").unwrap(),
            state: BatchState::PartiallyFailed,
            total_records: 1000,
            accepted: 995,
            rejected: 3,
            encryption_failures: 2,
            redacted_field_count: 12,
            skipped: 0,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let round: BatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(round.accepted, 995);
        assert_eq!(round.state, BatchState::PartiallyFailed);
    }
}
