//! Append-only audit events: one immutable event per record per stage
//! outcome, ordered by emission time within a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, RecordId};

/// Reason attached to redactions caused by a permission-matrix gap.
pub const REASON_UNMAPPED_PII: &str = "unmapped-pii-field";

/// Pipeline stage that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SchemaValidation,
    PiiScan,
    AccessFilter,
    Encryption,
    Batch,
}

/// Outcome of a stage for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Rejected,
    Redacted,
    Error,
}

/// Structured event detail. Never carries plaintext values or key
/// material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuditDetail {
    pub fn with_violations(violations: Vec<String>) -> Self {
        Self {
            violations,
            ..Self::default()
        }
    }

    pub fn with_fields(fields: Vec<String>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One immutable processing decision for one record at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub batch_id: BatchId,
    pub record_id: RecordId,
    pub stage: Stage,
    pub outcome: Outcome,
    #[serde(default)]
    pub detail: AuditDetail,
}

impl AuditEvent {
    pub fn new(
        batch_id: BatchId,
        record_id: RecordId,
        stage: Stage,
        outcome: Outcome,
        detail: AuditDetail,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            batch_id,
            record_id,
            stage,
            outcome,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_without_empty_detail_noise() {
        let event = AuditEvent::new(
            BatchId::new("b-1").unwrap(),
            RecordId::new("r-1").unwrap(),
            Stage::SchemaValidation,
            Outcome::Success,
            AuditDetail::default(),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"schema_validation\""));
        assert!(json.contains("\"success\""));
        assert!(!json.contains("violations"));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn rejected_event_round_trips() {
        let event = AuditEvent::new(
            BatchId::new("b-1").unwrap(),
            RecordId::new("r-2").unwrap(),
            Stage::SchemaValidation,
            Outcome::Rejected,
            AuditDetail::with_violations(vec!["patient_id: minLength".to_string()]),
        );
        let json = serde_json::to_string(&event).unwrap();
        let round: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(round.detail.violations.len(), 1);
        assert_eq!(round.outcome, Outcome::Rejected);
    }
}
