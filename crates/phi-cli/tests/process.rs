//! Smoke test for the `process` command against real files.

use std::fs;

use phi_cli::cli::ProcessArgs;
use phi_cli::commands::run_process;
use phi_model::{BatchState, Record};

const CONFIG: &str = r#"
    [engine]
    workers = 2
    salt = "deadbeef"

    [schema.v1.fields.patient_id]
    required = true
    type = "string"
    sensitive = true
    constraints = { min_length = 1 }

    [schema.v1.fields.note]
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

const INPUT: &str = r#"{"record_id": "r-1", "patient_id": "P1", "note": "routine visit"}
{"record_id": "r-2", "patient_id": "P2", "note": "SSN 123-45-6789 on file"}
{"record_id": "r-3", "patient_id": "", "note": "missing id"}
"#;

#[test]
fn process_writes_outputs_and_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("run.toml");
    let input_path = dir.path().join("intake.jsonl");
    fs::write(&config_path, CONFIG).unwrap();
    fs::write(&input_path, INPUT).unwrap();

    let args = ProcessArgs {
        input: input_path,
        config: config_path,
        schema_version: "v1".to_string(),
        role: "analyst".to_string(),
        batch_id: None,
        output_dir: None,
        dry_run: false,
    };
    let outcome = run_process(&args).unwrap();

    // batch id defaults to the input file stem
    assert_eq!(outcome.result.batch_id.as_str(), "intake");
    assert_eq!(outcome.result.state, BatchState::PartiallyFailed);
    assert_eq!(outcome.result.accepted, 2);
    assert_eq!(outcome.result.rejected, 1);

    let audit = fs::read_to_string(outcome.output_dir.join("audit.jsonl")).unwrap();
    assert!(audit.lines().count() > 2);
    assert!(audit.contains("schema_validation"));

    let records_text = fs::read_to_string(outcome.output_dir.join("records.jsonl")).unwrap();
    let records: Vec<Record> = records_text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    // plaintext PII never reaches the output for an unentitled role
    assert!(!records_text.contains("123-45-6789"));
    assert!(!records_text.contains("\"P1\""));

    assert!(outcome.output_dir.join("batch_result.json").exists());
    assert!(outcome.output_dir.join("metrics.json").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("run.toml");
    let input_path = dir.path().join("intake.jsonl");
    fs::write(&config_path, CONFIG).unwrap();
    fs::write(&input_path, INPUT).unwrap();

    let args = ProcessArgs {
        input: input_path,
        config: config_path,
        schema_version: "v1".to_string(),
        role: "clinician".to_string(),
        batch_id: Some("b-dry".to_string()),
        output_dir: None,
        dry_run: true,
    };
    let outcome = run_process(&args).unwrap();
    assert_eq!(outcome.result.batch_id.as_str(), "b-dry");
    assert!(!outcome.output_dir.exists());
}
