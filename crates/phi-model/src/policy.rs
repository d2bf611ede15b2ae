//! Run policy configuration: PII detector definitions, the role/field
//! permission matrix, and the field encryption specification.
//!
//! All three are loaded once at run start and are read-only shared state
//! for the duration of a batch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::Role;

/// What to do with a matched value the current role may not see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskStrategy {
    /// Mask every alphanumeric character in the match, preserving
    /// separators (`123-45-6789` -> `***-**-****`).
    Redact,
    /// Mask all but the trailing `reveal_last` alphanumerics.
    PartialReveal { reveal_last: usize },
    /// Replace the match with a stable pseudonymous token derived from a
    /// keyed digest of the value and the per-run salt.
    Tokenize,
}

/// A named PII detector definition.
///
/// The regex is compiled at configuration load; detection itself lives in
/// the redaction crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiPattern {
    pub name: String,
    pub pattern: String,
    pub strategy: MaskStrategy,
}

/// Whether a role may see a field unredacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    /// Field is not listed in the matrix at all.
    Unlisted,
    Granted,
    Denied,
}

/// Field name -> roles entitled to the unredacted value.
///
/// A field absent from the matrix is public by default; configuration
/// loading requires that default to be acknowledged explicitly, and the
/// access filter still fail-closes on unlisted fields carrying PII
/// findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    entries: BTreeMap<String, BTreeSet<Role>>,
}

impl PermissionMatrix {
    pub fn new(entries: BTreeMap<String, BTreeSet<Role>>) -> Self {
        Self { entries }
    }

    pub fn is_listed(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn entitlement(&self, field: &str, role: &Role) -> Entitlement {
        match self.entries.get(field) {
            None => Entitlement::Unlisted,
            Some(roles) if roles.contains(role) => Entitlement::Granted,
            Some(_) => Entitlement::Denied,
        }
    }

    /// All roles named anywhere in the matrix (for load-time validation).
    pub fn roles(&self) -> BTreeSet<&Role> {
        self.entries.values().flatten().collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// AEAD algorithm identifier carried alongside ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }
}

/// Encryption requirements for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldKeySpec {
    pub key_ref: String,
    pub algorithm: Algorithm,
}

/// Field name -> key reference + algorithm.
///
/// Every field flagged sensitive by schema or PII detection must have an
/// entry here, or the record is rejected (fail-closed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptionSpec {
    entries: BTreeMap<String, FieldKeySpec>,
}

impl EncryptionSpec {
    pub fn new(entries: BTreeMap<String, FieldKeySpec>) -> Self {
        Self { entries }
    }

    pub fn get(&self, field: &str) -> Option<&FieldKeySpec> {
        self.entries.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKeySpec)> {
        self.entries.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
