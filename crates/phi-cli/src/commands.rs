use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use phi_config::RunConfig;
use phi_engine::{AuditSink, BatchCoordinator, JsonlSink, MemorySink};
use phi_model::{BatchId, BatchRequest, BatchResult, FieldValue, MaskStrategy, Record, RecordId, Role};

use crate::cli::{CheckConfigArgs, ProcessArgs};
use crate::logging::redact_value;
use crate::summary::apply_table_style;

pub struct ProcessOutcome {
    pub result: BatchResult,
    pub output_dir: PathBuf,
}

/// One input line: a record id plus its fields.
#[derive(Debug, Deserialize)]
struct InputRecord {
    record_id: String,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

pub fn run_process(args: &ProcessArgs) -> Result<ProcessOutcome> {
    let config = RunConfig::from_path(&args.config).context("load run config")?;

    let batch_id = match &args.batch_id {
        Some(id) => id.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "batch".to_string()),
    };
    let batch_id = BatchId::new(batch_id)?;
    let role = Role::new(args.role.as_str())?;
    let records = read_records(&args.input, &batch_id)?;

    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("output"),
    };
    if !args.dry_run {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("create output dir {}", output_dir.display()))?;
    }

    let sink: Arc<dyn AuditSink> = if args.dry_run {
        Arc::new(MemorySink::new())
    } else {
        Arc::new(
            JsonlSink::create(&output_dir.join("audit.jsonl")).context("create audit trail")?,
        )
    };

    let bar = ProgressBar::new(u64::try_from(records.len()).unwrap_or(u64::MAX));
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} records") {
        bar.set_style(style);
    }
    let hook_bar = bar.clone();
    let coordinator = BatchCoordinator::new(&config, sink).with_progress(Box::new(
        move |completed, _total| {
            hook_bar.set_position(u64::try_from(completed).unwrap_or(u64::MAX));
        },
    ));

    let request = BatchRequest {
        batch_id,
        schema_version: args.schema_version.clone(),
        role,
        records,
    };
    let processed = coordinator.run(&request).context("process batch")?;
    bar.finish_and_clear();

    if !args.dry_run {
        write_jsonl(&output_dir.join("records.jsonl"), &processed.records)?;
        write_json(&output_dir.join("batch_result.json"), &processed.result)?;
        write_json(
            &output_dir.join("metrics.json"),
            &coordinator.metrics().snapshot(),
        )?;
        info!(output_dir = %output_dir.display(), "outputs written");
    }

    Ok(ProcessOutcome {
        result: processed.result,
        output_dir,
    })
}

pub fn run_check_config(args: &CheckConfigArgs) -> Result<()> {
    let config = RunConfig::from_path(&args.config).context("load run config")?;

    let mut table = Table::new();
    table.set_header(vec!["Schema", "Fields", "Sensitive"]);
    apply_table_style(&mut table);
    for (version, schema) in &config.schemas {
        table.add_row(vec![
            version.clone(),
            schema.fields.len().to_string(),
            schema.sensitive_fields().count().to_string(),
        ]);
    }
    println!("{table}");

    let mut table = Table::new();
    table.set_header(vec!["Pattern", "Strategy"]);
    apply_table_style(&mut table);
    for pattern in &config.patterns {
        table.add_row(vec![pattern.name.clone(), strategy_label(pattern.strategy)]);
    }
    println!("{table}");

    let mut table = Table::new();
    table.set_header(vec!["Encrypted field", "Key reference", "Algorithm"]);
    apply_table_style(&mut table);
    for (field, spec) in config.encryption.fields() {
        table.add_row(vec![
            field.to_string(),
            spec.key_ref.clone(),
            spec.algorithm.as_str().to_string(),
        ]);
    }
    println!("{table}");

    let roles: Vec<&str> = config.roles.iter().map(Role::as_str).collect();
    println!("Roles: {}", roles.join(", "));
    println!("Configuration OK");
    Ok(())
}

fn strategy_label(strategy: MaskStrategy) -> String {
    match strategy {
        MaskStrategy::Redact => "redact".to_string(),
        MaskStrategy::PartialReveal { reveal_last } => {
            format!("partial-reveal (last {reveal_last})")
        }
        MaskStrategy::Tokenize => "tokenize".to_string(),
    }
}

fn read_records(path: &Path, batch_id: &BatchId) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("open input {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read input line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let input: InputRecord = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(e) => {
                warn!(line = redact_value(&line), "malformed input line");
                return Err(e).with_context(|| format!("parse input line {}", idx + 1));
            }
        };
        let record_id = RecordId::new(input.record_id)
            .with_context(|| format!("input line {}", idx + 1))?;
        let mut record = Record::new(record_id, batch_id.clone());
        record.fields = input.fields;
        records.push(record);
    }
    info!(records = records.len(), input = %path.display(), "input loaded");
    Ok(records)
}

fn write_jsonl(path: &Path, records: &[Record]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("create {}", path.display()))?;
    for record in records {
        let line = serde_json::to_string(record)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
