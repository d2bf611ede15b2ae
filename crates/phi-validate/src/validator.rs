//! Record validation against a declared schema.
//!
//! Rules:
//!
//! - **Required**: field must be present and non-empty -> violation
//! - **Closed schema**: fields outside the declared set are violations,
//!   not warnings
//! - **Typed**: value variant must match the declared type; `date` fields
//!   must be ISO 8601
//! - **Constrained**: pattern / length / range / enum checks on present
//!   values
//!
//! Nested objects and arrays are validated recursively with the same
//! rules. All violations are collected before the accept/reject decision.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use phi_model::{FieldSpec, FieldType, FieldValue, Record, Schema, child_path, index_path};

/// Violation category, serialized in audit detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationCode {
    Required,
    MinLength,
    MaxLength,
    Type,
    Pattern,
    Enum,
    Range,
    DateFormat,
    UnexpectedField,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Type => "type",
            Self::Pattern => "pattern",
            Self::Enum => "enum",
            Self::Range => "range",
            Self::DateFormat => "dateFormat",
            Self::UnexpectedField => "unexpectedField",
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub path: String,
    pub code: ViolationCode,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.code.as_str(), self.message)
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Valid,
    Rejected(Vec<Violation>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Valid => &[],
            Self::Rejected(violations) => violations,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("invalid constraint pattern {pattern:?} for field {field}: {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },
}

/// Validator for one schema version.
///
/// Constraint regexes are compiled once at construction; the schema is
/// immutable for the run, so one validator serves every record in a
/// batch.
pub struct SchemaValidator<'a> {
    schema: &'a Schema,
    patterns: BTreeMap<String, Regex>,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(schema: &'a Schema) -> Result<Self, ValidateError> {
        let mut patterns = BTreeMap::new();
        compile_patterns(&schema.fields, "", &mut patterns)?;
        Ok(Self { schema, patterns })
    }

    /// Validate a record: collect every violation, then decide.
    pub fn validate(&self, record: &Record) -> ValidationOutcome {
        let mut violations = Vec::new();
        self.check_fields(&self.schema.fields, &record.fields, "", &mut violations);

        if violations.is_empty() {
            ValidationOutcome::Valid
        } else {
            debug!(
                record_id = %record.record_id,
                violations = violations.len(),
                "record rejected by schema validation"
            );
            ValidationOutcome::Rejected(violations)
        }
    }

    fn check_fields(
        &self,
        specs: &BTreeMap<String, FieldSpec>,
        values: &BTreeMap<String, FieldValue>,
        parent: &str,
        out: &mut Vec<Violation>,
    ) {
        for (name, spec) in specs {
            let path = child_path(parent, name);
            match values.get(name) {
                None | Some(FieldValue::Null) => {
                    if spec.required {
                        out.push(Violation {
                            path,
                            code: ViolationCode::Required,
                            message: format!("required field {name} not found"),
                        });
                    }
                }
                Some(value) => self.check_value(&path, spec, value, out),
            }
        }

        // Closed schema: anything outside the declared set is a violation.
        for name in values.keys() {
            if !specs.contains_key(name) {
                out.push(Violation {
                    path: child_path(parent, name),
                    code: ViolationCode::UnexpectedField,
                    message: format!("field {name} is not declared by the schema"),
                });
            }
        }
    }

    fn check_value(&self, path: &str, spec: &FieldSpec, value: &FieldValue, out: &mut Vec<Violation>) {
        if let FieldValue::Encrypted(_) = value {
            out.push(Violation {
                path: path.to_string(),
                code: ViolationCode::Type,
                message: "unexpected pre-encrypted value".to_string(),
            });
            return;
        }

        // Empty strings on required (or length-constrained) fields are
        // length violations so the rejection detail names the constraint.
        if let FieldValue::String(s) = value
            && s.trim().is_empty()
        {
            let min_length = spec.constraints.min_length.unwrap_or(usize::from(spec.required));
            if min_length > 0 {
                out.push(Violation {
                    path: path.to_string(),
                    code: ViolationCode::MinLength,
                    message: format!("value shorter than minimum length {min_length}"),
                });
            }
            return;
        }

        match spec.field_type {
            FieldType::String => match value {
                FieldValue::String(s) => self.check_string(path, spec, s, out),
                other => out.push(type_violation(path, "string", other)),
            },
            FieldType::Number => match value {
                FieldValue::Number(n) => check_range(path, spec, *n, out),
                other => out.push(type_violation(path, "number", other)),
            },
            FieldType::Date => match value {
                FieldValue::String(s) => {
                    if !crate::format::is_valid_iso8601(s) {
                        out.push(Violation {
                            path: path.to_string(),
                            code: ViolationCode::DateFormat,
                            message: format!("value {s:?} is not an ISO 8601 date"),
                        });
                    }
                }
                other => out.push(type_violation(path, "date", other)),
            },
            FieldType::Object => match value {
                FieldValue::Object(children) => {
                    self.check_fields(&spec.fields, children, path, out);
                }
                other => out.push(type_violation(path, "object", other)),
            },
            FieldType::Array => match value {
                FieldValue::Array(items) => {
                    if let Some(item_spec) = &spec.items {
                        for (idx, item) in items.iter().enumerate() {
                            self.check_value(&index_path(path, idx), item_spec, item, out);
                        }
                    }
                }
                other => out.push(type_violation(path, "array", other)),
            },
        }
    }

    fn check_string(&self, path: &str, spec: &FieldSpec, value: &str, out: &mut Vec<Violation>) {
        let length = value.chars().count();

        if let Some(min) = spec.constraints.min_length
            && length < min
        {
            out.push(Violation {
                path: path.to_string(),
                code: ViolationCode::MinLength,
                message: format!("value shorter than minimum length {min}"),
            });
        }

        if let Some(max) = spec.constraints.max_length
            && length > max
        {
            out.push(Violation {
                path: path.to_string(),
                code: ViolationCode::MaxLength,
                message: format!("value longer than maximum length {max}"),
            });
        }

        if let Some(pattern) = &spec.constraints.pattern
            && let Some(regex) = self.patterns.get(pattern)
            && !regex.is_match(value)
        {
            out.push(Violation {
                path: path.to_string(),
                code: ViolationCode::Pattern,
                message: format!("value does not match pattern {pattern:?}"),
            });
        }

        if let Some(allowed) = &spec.constraints.allowed
            && !allowed.iter().any(|candidate| candidate == value)
        {
            out.push(Violation {
                path: path.to_string(),
                code: ViolationCode::Enum,
                message: format!("value {value:?} not in allowed set [{}]", allowed.join(", ")),
            });
        }
    }
}

fn check_range(path: &str, spec: &FieldSpec, value: f64, out: &mut Vec<Violation>) {
    if let Some(min) = spec.constraints.minimum
        && value < min
    {
        out.push(Violation {
            path: path.to_string(),
            code: ViolationCode::Range,
            message: format!("value {value} below minimum {min}"),
        });
    }
    if let Some(max) = spec.constraints.maximum
        && value > max
    {
        out.push(Violation {
            path: path.to_string(),
            code: ViolationCode::Range,
            message: format!("value {value} above maximum {max}"),
        });
    }
}

fn type_violation(path: &str, expected: &str, actual: &FieldValue) -> Violation {
    let actual = match actual {
        FieldValue::Null => "null",
        FieldValue::String(_) => "string",
        FieldValue::Number(_) => "number",
        FieldValue::Encrypted(_) => "encrypted",
        FieldValue::Array(_) => "array",
        FieldValue::Object(_) => "object",
    };
    Violation {
        path: path.to_string(),
        code: ViolationCode::Type,
        message: format!("expected {expected}, found {actual}"),
    }
}

fn compile_patterns(
    specs: &BTreeMap<String, FieldSpec>,
    parent: &str,
    out: &mut BTreeMap<String, Regex>,
) -> Result<(), ValidateError> {
    for (name, spec) in specs {
        compile_spec_patterns(spec, &child_path(parent, name), out)?;
    }
    Ok(())
}

fn compile_spec_patterns(
    spec: &FieldSpec,
    path: &str,
    out: &mut BTreeMap<String, Regex>,
) -> Result<(), ValidateError> {
    if let Some(pattern) = &spec.constraints.pattern
        && !out.contains_key(pattern)
    {
        let regex = Regex::new(pattern).map_err(|e| ValidateError::InvalidPattern {
            field: path.to_string(),
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        out.insert(pattern.clone(), regex);
    }
    compile_patterns(&spec.fields, path, out)?;
    if let Some(items) = &spec.items {
        compile_spec_patterns(items, &format!("{path}[]"), out)?;
    }
    Ok(())
}
