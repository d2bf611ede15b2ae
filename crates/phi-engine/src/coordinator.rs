//! Batch orchestration.
//!
//! A batch is processed by a bounded worker pool over a shared atomic
//! cursor. Stages run sequentially per record inside one worker, so a
//! record's audit events always arrive in stage order. Per-record
//! failures are caught at the record boundary; only audit-sink loss and
//! batch-wide key failure escalate to a `Failed` batch.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use phi_config::RunConfig;
use phi_crypto::{CryptoError, FieldEncryptor, KeyResolver};
use phi_model::{
    AuditDetail, AuditEvent, BatchRequest, BatchResult, BatchState, FieldValue, Outcome,
    ProcessedBatch, REASON_UNMAPPED_PII, Record, RecordId, Stage, path_root,
};
use phi_redact::{AccessFilter, DetectorRegistry};
use phi_validate::SchemaValidator;

use crate::audit::{AuditRecorder, AuditSink};
use crate::error::EngineError;
use crate::metrics::EngineMetrics;

/// Cooperative cancellation shared with the caller. Cancelling stops new
/// dispatch; in-flight records run to completion.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Called after each record reaches a terminal state: (completed, total).
pub type ProgressHook = Box<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Accepted,
    Rejected,
    Errored,
}

struct Processed {
    outcome: RecordOutcome,
    record: Option<Record>,
    redacted_fields: u64,
    key_failure: bool,
}

/// Drives one batch through validation, PII scan, access filtering, and
/// encryption, emitting the audit trail as it goes.
pub struct BatchCoordinator<'a> {
    config: &'a RunConfig,
    recorder: AuditRecorder,
    metrics: Arc<EngineMetrics>,
    cancel: CancellationToken,
    progress: Option<ProgressHook>,
    resolver: Option<&'a dyn KeyResolver>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(config: &'a RunConfig, sink: Arc<dyn AuditSink>) -> Self {
        let metrics = Arc::new(EngineMetrics::default());
        let timeout = Duration::from_millis(config.engine.timeout_ms);
        Self {
            config,
            recorder: AuditRecorder::new(sink, Arc::clone(&metrics), timeout),
            metrics,
            cancel: CancellationToken::new(),
            progress: None,
            resolver: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Override the configured key material with an external resolution
    /// service.
    #[must_use]
    pub fn with_resolver(mut self, resolver: &'a dyn KeyResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process one batch to a terminal state.
    ///
    /// Returns `Err` only for pre-dispatch failures (unknown schema
    /// version, invalid configuration); everything that happens after
    /// dispatch is reported inside the `BatchResult`.
    pub fn run(&self, request: &BatchRequest) -> Result<ProcessedBatch, EngineError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let schema = self
            .config
            .schema(&request.schema_version)
            .ok_or_else(|| EngineError::UnknownSchemaVersion(request.schema_version.clone()))?;
        let validator = SchemaValidator::new(schema)?;
        let registry = DetectorRegistry::from_patterns(&self.config.patterns)?;
        let resolver = self.resolver.unwrap_or(&self.config.resolver);
        let encryptor = FieldEncryptor::new(&self.config.encryption, resolver);
        let filter = AccessFilter::new(
            &self.config.matrix,
            &request.role,
            &self.config.engine.salt,
        );
        let schema_sensitive: BTreeSet<String> =
            schema.sensitive_fields().map(str::to_string).collect();
        let timeout = Duration::from_millis(self.config.engine.timeout_ms);

        let total = request.records.len();
        let slots: Vec<OnceLock<Processed>> = (0..total).map(|_| OnceLock::new()).collect();
        let cursor = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);
        let workers = self.config.engine.workers.clamp(1, total.max(1));

        info!(
            batch_id = %request.batch_id,
            records = total,
            workers,
            schema = %request.schema_version,
            role = %request.role,
            "batch dispatch started"
        );

        if total > 0 {
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| {
                        loop {
                            if self.cancel.is_cancelled() || !self.recorder.is_healthy() {
                                break;
                            }
                            let idx = cursor.fetch_add(1, Ordering::SeqCst);
                            if idx >= total {
                                break;
                            }
                            let processed = self.process_record(
                                request,
                                &request.records[idx],
                                &validator,
                                &registry,
                                &filter,
                                &encryptor,
                                &schema_sensitive,
                                timeout,
                            );
                            self.metrics.inc_records_processed();
                            match processed.outcome {
                                RecordOutcome::Rejected => self.metrics.inc_records_rejected(),
                                RecordOutcome::Errored => self.metrics.inc_encryption_failures(),
                                RecordOutcome::Accepted => {}
                            }
                            self.metrics.add_redacted_fields(processed.redacted_fields);
                            let _ = slots[idx].set(processed);

                            let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                            if let Some(progress) = &self.progress {
                                progress(completed, total);
                            }
                        }
                    });
                }
            });
        }

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        let mut errored = 0usize;
        let mut skipped = 0usize;
        let mut key_failures = 0usize;
        let mut redacted_field_count = 0u64;
        let mut records = Vec::new();
        for slot in slots {
            match slot.into_inner() {
                None => skipped += 1,
                Some(processed) => {
                    redacted_field_count += processed.redacted_fields;
                    match processed.outcome {
                        RecordOutcome::Accepted => {
                            accepted += 1;
                            if let Some(record) = processed.record {
                                records.push(record);
                            }
                        }
                        RecordOutcome::Rejected => rejected += 1,
                        RecordOutcome::Errored => {
                            errored += 1;
                            if processed.key_failure {
                                key_failures += 1;
                            }
                        }
                    }
                }
            }
        }

        let dispatched = total - skipped;
        let sink_lost = !self.recorder.is_healthy();
        let all_keys_failed = dispatched > 0 && key_failures == dispatched;
        let state = if sink_lost || all_keys_failed {
            BatchState::Failed
        } else if rejected == 0 && errored == 0 && skipped == 0 {
            BatchState::Completed
        } else {
            BatchState::PartiallyFailed
        };

        if sink_lost {
            warn!(batch_id = %request.batch_id, "audit sink lost, batch failed");
        }

        let completed_at = Utc::now();
        self.metrics.set_last_batch_duration_ms(
            u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        );

        if let Ok(record_id) = RecordId::new(request.batch_id.as_str()) {
            let outcome = if state == BatchState::Failed {
                Outcome::Error
            } else {
                Outcome::Success
            };
            self.recorder.record(AuditEvent::new(
                request.batch_id.clone(),
                record_id,
                Stage::Batch,
                outcome,
                AuditDetail::with_message(format!(
                    "accepted {accepted}, rejected {rejected}, errors {errored}, skipped {skipped}"
                )),
            ));
        }

        info!(
            batch_id = %request.batch_id,
            ?state,
            accepted,
            rejected,
            errors = errored,
            skipped,
            "batch finished"
        );

        Ok(ProcessedBatch {
            result: BatchResult {
                batch_id: request.batch_id.clone(),
                state,
                total_records: total,
                accepted,
                rejected,
                encryption_failures: errored,
                redacted_field_count: usize::try_from(redacted_field_count)
                    .unwrap_or(usize::MAX),
                skipped,
                started_at,
                completed_at,
            },
            records,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_record(
        &self,
        request: &BatchRequest,
        record: &Record,
        validator: &SchemaValidator<'_>,
        registry: &DetectorRegistry,
        filter: &AccessFilter<'_>,
        encryptor: &FieldEncryptor<'_>,
        schema_sensitive: &BTreeSet<String>,
        timeout: Duration,
    ) -> Processed {
        let batch_id = request.batch_id.clone();
        let record_id = record.record_id.clone();

        let outcome = validator.validate(record);
        if !outcome.is_valid() {
            let violations: Vec<String> = outcome
                .violations()
                .iter()
                .map(|v| format!("{}: {}", v.path, v.code.as_str()))
                .collect();
            self.recorder.record(AuditEvent::new(
                batch_id,
                record_id,
                Stage::SchemaValidation,
                Outcome::Rejected,
                AuditDetail::with_violations(violations),
            ));
            return Processed {
                outcome: RecordOutcome::Rejected,
                record: None,
                redacted_fields: 0,
                key_failure: false,
            };
        }
        self.recorder.record(AuditEvent::new(
            batch_id.clone(),
            record_id.clone(),
            Stage::SchemaValidation,
            Outcome::Success,
            AuditDetail::default(),
        ));

        let findings = registry.scan(record);
        let (filtered, actions) = filter.filter(record, &findings);

        if !actions.is_empty() {
            let mut patterns: Vec<String> =
                actions.iter().flat_map(|a| a.patterns.clone()).collect();
            patterns.sort();
            patterns.dedup();
            if !patterns.is_empty() {
                self.recorder.record(AuditEvent::new(
                    batch_id.clone(),
                    record_id.clone(),
                    Stage::PiiScan,
                    Outcome::Redacted,
                    AuditDetail {
                        patterns,
                        ..AuditDetail::default()
                    },
                ));
            }

            let mut masked: Vec<String> = actions
                .iter()
                .filter(|a| a.reason.is_none())
                .map(|a| a.path.clone())
                .collect();
            masked.dedup();
            if !masked.is_empty() {
                self.recorder.record(AuditEvent::new(
                    batch_id.clone(),
                    record_id.clone(),
                    Stage::AccessFilter,
                    Outcome::Redacted,
                    AuditDetail::with_fields(masked),
                ));
            }

            let mut gaps: Vec<String> = actions
                .iter()
                .filter(|a| a.reason.is_some())
                .map(|a| a.path.clone())
                .collect();
            gaps.dedup();
            if !gaps.is_empty() {
                self.recorder.record(AuditEvent::new(
                    batch_id.clone(),
                    record_id.clone(),
                    Stage::AccessFilter,
                    Outcome::Redacted,
                    AuditDetail {
                        reason: Some(REASON_UNMAPPED_PII.to_string()),
                        fields: gaps,
                        ..AuditDetail::default()
                    },
                ));
            }
        }
        let redacted_paths: BTreeSet<&str> = actions.iter().map(|a| a.path.as_str()).collect();
        let redacted_fields = u64::try_from(redacted_paths.len()).unwrap_or(u64::MAX);

        // Fields still carrying plaintext PII after filtering (the role
        // was entitled to see them) must be encrypted at rest, alongside
        // everything the schema marks sensitive.
        let mut required = schema_sensitive.clone();
        for path in registry.scan(&filtered).paths() {
            required.insert(path_root(path).to_string());
        }

        let begin = Instant::now();
        let result = encryptor.encrypt_record(&filtered, &required);
        let elapsed = begin.elapsed();

        match result {
            Ok(sealed) if elapsed <= timeout => {
                let encrypted: Vec<String> = sealed
                    .fields
                    .iter()
                    .filter(|(_, v)| matches!(v, FieldValue::Encrypted(_)))
                    .map(|(name, _)| name.clone())
                    .collect();
                self.recorder.record(AuditEvent::new(
                    batch_id,
                    record_id,
                    Stage::Encryption,
                    Outcome::Success,
                    AuditDetail::with_fields(encrypted),
                ));
                Processed {
                    outcome: RecordOutcome::Accepted,
                    record: Some(sealed),
                    redacted_fields,
                    key_failure: false,
                }
            }
            Ok(_) => {
                self.recorder.record(AuditEvent::new(
                    batch_id,
                    record_id,
                    Stage::Encryption,
                    Outcome::Error,
                    AuditDetail::with_message(format!(
                        "encryption exceeded the {}ms operation deadline",
                        timeout.as_millis()
                    )),
                ));
                Processed {
                    outcome: RecordOutcome::Errored,
                    record: None,
                    redacted_fields,
                    key_failure: false,
                }
            }
            Err(e) => {
                let key_failure = matches!(e, CryptoError::Key(_));
                self.recorder.record(AuditEvent::new(
                    batch_id,
                    record_id,
                    Stage::Encryption,
                    Outcome::Error,
                    AuditDetail::with_message(e.to_string()),
                ));
                Processed {
                    outcome: RecordOutcome::Errored,
                    record: None,
                    redacted_fields,
                    key_failure,
                }
            }
        }
    }
}
