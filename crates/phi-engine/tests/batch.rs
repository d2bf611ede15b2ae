//! End-to-end batch runs against an in-memory audit sink.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use phi_config::RunConfig;
use phi_engine::{AuditSink, BatchCoordinator, EngineError, MemorySink};
use phi_model::{
    AuditEvent, BatchId, BatchRequest, BatchState, FieldValue, Outcome, REASON_UNMAPPED_PII,
    Record, RecordId, Role, Stage,
};

const CONFIG: &str = r#"
    [engine]
    workers = 2
    timeout_ms = 30000
    salt = "deadbeef"

    [schema.v1.fields.patient_id]
    required = true
    type = "string"
    sensitive = true
    constraints = { min_length = 1 }

    [schema.v1.fields.note]
    type = "string"

    [schema.v1.fields.encounter_type]
    type = "string"

    [matrix]
    unlisted_fields = "public"
    roles = ["clinician", "analyst"]

    [matrix.fields]
    patient_id = ["clinician"]
    ssn = ["clinician"]

    [encryption.fields.patient_id]
    key_ref = "patient-data-key"
    algorithm = "AES-256-GCM"

    [encryption.keys]
    patient-data-key = "KioqKioqKioqKioqKioqKioqKioqKioqKioqKioqKio="
    "#;

fn config() -> RunConfig {
    RunConfig::from_toml_str(CONFIG).unwrap()
}

fn record(id: &str, patient_id: &str, note: &str) -> Record {
    Record::new(RecordId::new(id).unwrap(), BatchId::new("b-1").unwrap())
        .with_field("patient_id", patient_id)
        .with_field("note", note)
        .with_field("encounter_type", "outpatient")
}

fn request(role: &str, records: Vec<Record>) -> BatchRequest {
    BatchRequest {
        batch_id: BatchId::new("b-1").unwrap(),
        schema_version: "v1".to_string(),
        role: Role::new(role).unwrap(),
        records,
    }
}

// `Arc::clone` would infer its type parameter from the coordinator's
// parameter slot; the unsizing to `Arc<dyn AuditSink>` needs a concrete
// intermediate handle.
fn audit_sink(sink: &Arc<MemorySink>) -> Arc<dyn AuditSink> {
    let shared: Arc<MemorySink> = Arc::clone(sink);
    shared
}

struct FailingSink;

impl AuditSink for FailingSink {
    fn append(&self, _event: &AuditEvent) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

struct BlockingSink;

impl AuditSink for BlockingSink {
    fn append(&self, _event: &AuditEvent) -> io::Result<()> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(())
    }
}

struct SlowResolver;

impl phi_crypto::KeyResolver for SlowResolver {
    fn resolve(&self, _key_ref: &str) -> Result<[u8; phi_crypto::KEY_LEN], phi_crypto::KeyError> {
        std::thread::sleep(Duration::from_millis(200));
        Ok([0x2a; phi_crypto::KEY_LEN])
    }
}

#[test]
fn mixed_outcomes_are_counted() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink));

    let mut records = Vec::new();
    for i in 0..7 {
        records.push(record(&format!("r-good-{i}"), &format!("P{i}"), "routine"));
    }
    // empty required field: schema rejection
    records.push(record("r-bad-1", "", "routine"));
    records.push(record("r-bad-2", "", "routine"));
    // entitled role keeps the SSN in plaintext, and `note` has no
    // encryption entry: fail-closed per-record error
    records.push(record("r-err-1", "P99", "SSN 123-45-6789"));

    let processed = coordinator.run(&request("clinician", records)).unwrap();
    let result = &processed.result;
    assert_eq!(result.state, BatchState::PartiallyFailed);
    assert_eq!(result.total_records, 10);
    assert_eq!(result.accepted, 7);
    assert_eq!(result.rejected, 2);
    assert_eq!(result.encryption_failures, 1);
    assert_eq!(result.skipped, 0);

    // only accepted records flow onward, all with patient_id sealed
    assert_eq!(processed.records.len(), 7);
    for rec in &processed.records {
        assert!(matches!(
            rec.fields["patient_id"],
            FieldValue::Encrypted(_)
        ));
    }

    let snapshot = coordinator.metrics().snapshot();
    assert_eq!(snapshot.records_processed, 10);
    assert_eq!(snapshot.records_rejected, 2);
    assert_eq!(snapshot.encryption_failures, 1);
    assert_eq!(snapshot.audit_write_failures, 0);
}

#[test]
fn audit_events_stay_in_stage_order_per_record() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink));

    let records = vec![
        record("r-1", "P1", "routine"),
        record("r-2", "", "routine"),
        record("r-3", "P3", "routine"),
    ];
    coordinator.run(&request("clinician", records)).unwrap();

    let events = sink.events();
    for id in ["r-1", "r-3"] {
        let stages: Vec<Stage> = events
            .iter()
            .filter(|e| e.record_id.as_str() == id)
            .map(|e| e.stage)
            .collect();
        assert_eq!(
            stages,
            vec![Stage::SchemaValidation, Stage::Encryption],
            "unexpected stage order for {id}"
        );
    }

    let rejected: Vec<&AuditEvent> = events
        .iter()
        .filter(|e| e.record_id.as_str() == "r-2")
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].outcome, Outcome::Rejected);
    assert_eq!(
        rejected[0].detail.violations,
        vec!["patient_id: minLength".to_string()]
    );

    // one batch-level closing event
    assert_eq!(
        events.iter().filter(|e| e.stage == Stage::Batch).count(),
        1
    );
}

#[test]
fn unentitled_role_is_masked_and_audited() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink));

    let records = vec![record(
        "r-1",
        "P1",
        "SSN 123-45-6789, call 555-867-5309",
    )];
    let processed = coordinator.run(&request("analyst", records)).unwrap();

    assert_eq!(processed.result.state, BatchState::Completed);
    assert_eq!(processed.result.accepted, 1);
    // patient_id (denied) and note (findings) were both redacted
    assert_eq!(processed.result.redacted_field_count, 2);

    let note = processed.records[0].fields["note"].as_str().unwrap();
    assert!(note.contains("***-**-****"));
    assert!(!note.contains("123-45-6789"));
    assert!(!note.contains("555-867"));

    let events = sink.events();
    let pii_scan = events
        .iter()
        .find(|e| e.stage == Stage::PiiScan)
        .expect("pii scan event");
    assert_eq!(pii_scan.outcome, Outcome::Redacted);
    assert_eq!(pii_scan.detail.patterns, vec!["phone", "ssn"]);

    // phone has no matrix entry: separate matrix-gap event
    let gap = events
        .iter()
        .find(|e| e.detail.reason.as_deref() == Some(REASON_UNMAPPED_PII))
        .expect("matrix gap event");
    assert_eq!(gap.stage, Stage::AccessFilter);
    assert_eq!(gap.detail.fields, vec!["note"]);
}

#[test]
fn unknown_schema_version_is_rejected_before_dispatch() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink));

    let mut req = request("clinician", vec![record("r-1", "P1", "x")]);
    req.schema_version = "v9".to_string();

    let err = coordinator.run(&req).unwrap_err();
    assert!(matches!(err, EngineError::UnknownSchemaVersion(v) if v == "v9"));
    assert!(sink.events().is_empty());
}

#[test]
fn audit_sink_failure_fails_the_batch() {
    let mut config = config();
    config.engine.workers = 1;
    let coordinator = BatchCoordinator::new(&config, Arc::new(FailingSink));

    let records: Vec<Record> = (0..5)
        .map(|i| record(&format!("r-{i}"), &format!("P{i}"), "routine"))
        .collect();
    let processed = coordinator.run(&request("clinician", records)).unwrap();

    let result = &processed.result;
    assert_eq!(result.state, BatchState::Failed);
    // the first record latched the sink unhealthy; the rest never ran
    assert_eq!(result.skipped, 4);
    assert_eq!(coordinator.metrics().snapshot().audit_write_failures, 1);
}

#[test]
fn blocking_audit_sink_does_not_stall_the_batch() {
    let mut config = config();
    config.engine.timeout_ms = 50;
    let coordinator = BatchCoordinator::new(&config, Arc::new(BlockingSink));

    let begin = std::time::Instant::now();
    let processed = coordinator
        .run(&request("clinician", vec![record("r-1", "P1", "routine")]))
        .unwrap();

    assert!(begin.elapsed() < Duration::from_secs(3));
    assert_eq!(processed.result.state, BatchState::Failed);
    assert_eq!(coordinator.metrics().snapshot().audit_write_failures, 1);
}

#[test]
fn encryption_deadline_overrun_errors_the_record() {
    let mut config = config();
    config.engine.timeout_ms = 50;
    let sink = Arc::new(MemorySink::new());
    let resolver = SlowResolver;
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink)).with_resolver(&resolver);

    let processed = coordinator
        .run(&request("clinician", vec![record("r-1", "P1", "routine")]))
        .unwrap();

    let result = &processed.result;
    assert_eq!(result.state, BatchState::PartiallyFailed);
    assert_eq!(result.accepted, 0);
    assert_eq!(result.encryption_failures, 1);
    assert!(processed.records.is_empty());

    let events = sink.events();
    let event = events
        .iter()
        .find(|e| e.stage == Stage::Encryption)
        .expect("encryption event");
    assert_eq!(event.outcome, Outcome::Error);
    assert!(
        event
            .detail
            .message
            .as_deref()
            .unwrap_or("")
            .contains("deadline")
    );
}

#[test]
fn cancellation_skips_undispatched_records() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, sink);
    coordinator.cancellation().cancel();

    let records: Vec<Record> = (0..5)
        .map(|i| record(&format!("r-{i}"), &format!("P{i}"), "routine"))
        .collect();
    let processed = coordinator.run(&request("clinician", records)).unwrap();

    assert_eq!(processed.result.skipped, 5);
    assert_eq!(processed.result.accepted, 0);
    assert_eq!(processed.result.state, BatchState::PartiallyFailed);
    assert!(processed.records.is_empty());
}

#[test]
fn key_resolution_failing_for_every_record_fails_the_batch() {
    let mut config = config();
    // key material gone at run time while the spec still cites it
    config.resolver = phi_crypto::StaticKeyResolver::default();
    let sink = Arc::new(MemorySink::new());
    let coordinator = BatchCoordinator::new(&config, audit_sink(&sink));

    let records: Vec<Record> = (0..3)
        .map(|i| record(&format!("r-{i}"), &format!("P{i}"), "routine"))
        .collect();
    let processed = coordinator.run(&request("clinician", records)).unwrap();

    let result = &processed.result;
    assert_eq!(result.state, BatchState::Failed);
    assert_eq!(result.encryption_failures, 3);
    assert!(
        sink.events()
            .iter()
            .any(|e| e.stage == Stage::Encryption && e.outcome == Outcome::Error)
    );
}

#[test]
fn progress_hook_reports_every_record() {
    let config = config();
    let sink = Arc::new(MemorySink::new());
    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen_hook = Arc::clone(&seen);
    let coordinator = BatchCoordinator::new(&config, sink).with_progress(Box::new(
        move |_completed, total| {
            assert_eq!(total, 4);
            seen_hook.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        },
    ));

    let records: Vec<Record> = (0..4)
        .map(|i| record(&format!("r-{i}"), &format!("P{i}"), "routine"))
        .collect();
    coordinator.run(&request("clinician", records)).unwrap();
    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 4);
}
