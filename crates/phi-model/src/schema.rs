//! Declared record schema: closed field set, per-field type and
//! constraints, immutable once loaded for a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Object,
    Array,
}

/// Value constraints applied to a present field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Regex the full value must match (string fields).
    pub pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Inclusive numeric bounds (number fields).
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Enumerated allowed values (string fields).
    pub allowed: Option<Vec<String>>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.allowed.is_none()
    }
}

/// Per-field schema declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub constraints: Constraints,
    /// Marks the field for mandatory encryption regardless of PII findings.
    #[serde(default)]
    pub sensitive: bool,
    /// Child declarations for `Object` fields (closed set, like the root).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldSpec>,
    /// Element declaration for `Array` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            required: false,
            field_type,
            constraints: Constraints::default(),
            sensitive: false,
            fields: BTreeMap::new(),
            items: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// A versioned, closed record schema.
///
/// All records in a batch validate against the same schema version; a
/// batch citing an unknown version is rejected outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub version: String,
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Top-level field names marked `sensitive`.
    pub fn sensitive_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.sensitive)
            .map(|(name, _)| name.as_str())
    }
}
