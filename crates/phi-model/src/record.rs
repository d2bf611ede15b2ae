//! Record representation: an ordered mapping of field name to typed value.
//!
//! Stages never mutate a record in place; each stage consumes a `Record`
//! and produces a new one (or a rejection).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, RecordId};

/// A field value after encryption: ciphertext plus key metadata.
///
/// `ciphertext` and `nonce` are base64; the authentication tag is part of
/// the ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedValue {
    pub ciphertext: String,
    pub key_ref: String,
    pub algorithm: String,
    pub nonce: String,
}

/// A typed field value.
///
/// Dates travel as ISO 8601 strings; the schema decides whether a string
/// field is date-typed. `Encrypted` only appears after the encryption
/// stage has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    String(String),
    Number(f64),
    Encrypted(EncryptedValue),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for `Null` and for strings that are empty after trimming.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A single health record tagged with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: RecordId,
    pub source_batch_id: BatchId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(record_id: RecordId, source_batch_id: BatchId) -> Self {
        Self {
            record_id,
            source_batch_id,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Produce a copy of this record with a replaced field map.
    #[must_use]
    pub fn with_fields(&self, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            record_id: self.record_id.clone(),
            source_batch_id: self.source_batch_id.clone(),
            fields,
        }
    }
}

/// Dotted field path with `[idx]` segments for array elements,
/// e.g. `visit.notes[2]`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

pub fn index_path(parent: &str, idx: usize) -> String {
    format!("{parent}[{idx}]")
}

/// Top-level field name of a path (`visit.notes[2]` -> `visit`).
pub fn path_root(path: &str) -> &str {
    let end = path
        .find(|c| c == '.' || c == '[')
        .unwrap_or(path.len());
    &path[..end]
}
