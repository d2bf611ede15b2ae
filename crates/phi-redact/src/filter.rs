//! Role-based field redaction.
//!
//! The filter consumes PII findings and the permission matrix and
//! produces a new record. Entitlement is resolved twice:
//!
//! - the record field itself (by path, falling back to its top-level
//!   name) — a denied field without findings is withheld wholesale;
//! - each finding's pattern name (the logical identifier class, e.g.
//!   `ssn`) — so a free-text note is masked when the role is not
//!   entitled to the identifiers found inside it.
//!
//! Policy is fail-closed: a finding whose pattern has no matrix entry is
//! a configuration gap and is masked with the most conservative
//! strategy, never passed through. A field-level grant does not override
//! pattern entitlements either: a role granted the containing field
//! still has unentitled identifiers inside it masked. Releasing an
//! identifier class requires listing it for the role, not just its
//! carrier field.

use std::collections::BTreeMap;

use tracing::debug;

use phi_model::{
    Entitlement, FieldValue, MaskStrategy, PermissionMatrix, Record, Role, child_path, index_path,
    path_root,
};

use crate::detector::{Findings, PatternMatch};
use crate::mask::{REDACTED_MARKER, mask_text};

/// One redaction applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionAction {
    pub path: String,
    /// Names of the patterns whose matches were masked (empty for a
    /// whole-field permission denial without findings).
    pub patterns: Vec<String>,
    /// `Some(REASON_UNMAPPED_PII)` for matrix-gap redactions.
    pub reason: Option<String>,
}

/// Applies the permission matrix for one processing role.
///
/// Deterministic: the same record, findings, and role always produce the
/// same output, and filtering an already-filtered record is a no-op.
pub struct AccessFilter<'a> {
    matrix: &'a PermissionMatrix,
    role: &'a Role,
    salt: &'a [u8],
}

impl<'a> AccessFilter<'a> {
    pub fn new(matrix: &'a PermissionMatrix, role: &'a Role, salt: &'a [u8]) -> Self {
        Self { matrix, role, salt }
    }

    /// Produce the filtered record plus the actions taken, for auditing.
    pub fn filter(&self, record: &Record, findings: &Findings) -> (Record, Vec<RedactionAction>) {
        let mut actions = Vec::new();
        let mut fields = BTreeMap::new();
        for (name, value) in &record.fields {
            let path = child_path("", name);
            fields.insert(
                name.clone(),
                self.filter_value(&path, value, findings, &mut actions),
            );
        }
        if !actions.is_empty() {
            debug!(
                record_id = %record.record_id,
                redactions = actions.len(),
                "access filter redacted fields"
            );
        }
        (record.with_fields(fields), actions)
    }

    fn filter_value(
        &self,
        path: &str,
        value: &FieldValue,
        findings: &Findings,
        actions: &mut Vec<RedactionAction>,
    ) -> FieldValue {
        match value {
            FieldValue::Object(children) => {
                let mut out = BTreeMap::new();
                for (name, child) in children {
                    let child_p = child_path(path, name);
                    out.insert(
                        name.clone(),
                        self.filter_value(&child_p, child, findings, actions),
                    );
                }
                FieldValue::Object(out)
            }
            FieldValue::Array(items) => FieldValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        self.filter_value(&index_path(path, idx), item, findings, actions)
                    })
                    .collect(),
            ),
            FieldValue::Null | FieldValue::Encrypted(_) => value.clone(),
            FieldValue::String(_) | FieldValue::Number(_) => {
                self.filter_scalar(path, value, findings, actions)
            }
        }
    }

    fn filter_scalar(
        &self,
        path: &str,
        value: &FieldValue,
        findings: &Findings,
        actions: &mut Vec<RedactionAction>,
    ) -> FieldValue {
        let field_entitlement = self.field_entitlement(path);

        let Some(matches) = findings.get(path) else {
            // No findings: only a field-level denial withholds the value.
            return match field_entitlement {
                Entitlement::Denied => {
                    if value.as_str() == Some(REDACTED_MARKER) {
                        value.clone()
                    } else {
                        actions.push(RedactionAction {
                            path: path.to_string(),
                            patterns: Vec::new(),
                            reason: None,
                        });
                        FieldValue::String(REDACTED_MARKER.to_string())
                    }
                }
                Entitlement::Granted | Entitlement::Unlisted => value.clone(),
            };
        };

        // Partition findings by entitlement on the pattern name. A
        // field-level denial masks everything found in the field.
        let mut mapped: Vec<PatternMatch> = Vec::new();
        let mut unmapped: Vec<PatternMatch> = Vec::new();
        for m in matches {
            let entitlement = match field_entitlement {
                Entitlement::Denied => Entitlement::Denied,
                _ => self.matrix.entitlement(&m.pattern, self.role),
            };
            match entitlement {
                Entitlement::Granted => {}
                Entitlement::Denied => mapped.push(m.clone()),
                // Matrix gap: most conservative strategy, never pass through.
                Entitlement::Unlisted => unmapped.push(PatternMatch {
                    strategy: MaskStrategy::Redact,
                    ..m.clone()
                }),
            }
        }

        if mapped.is_empty() && unmapped.is_empty() {
            return value.clone();
        }

        if !mapped.is_empty() {
            actions.push(RedactionAction {
                path: path.to_string(),
                patterns: mapped.iter().map(|m| m.pattern.clone()).collect(),
                reason: None,
            });
        }
        if !unmapped.is_empty() {
            actions.push(RedactionAction {
                path: path.to_string(),
                patterns: unmapped.iter().map(|m| m.pattern.clone()).collect(),
                reason: Some(phi_model::REASON_UNMAPPED_PII.to_string()),
            });
        }

        match value {
            FieldValue::String(text) => {
                let mut to_mask = mapped;
                to_mask.extend(unmapped);
                FieldValue::String(mask_text(text, &to_mask, self.salt))
            }
            // Findings only arise on strings; anything else is withheld.
            _ => FieldValue::String(REDACTED_MARKER.to_string()),
        }
    }

    /// Entitlement for a record field; nested paths fall back to their
    /// top-level name.
    fn field_entitlement(&self, path: &str) -> Entitlement {
        match self.matrix.entitlement(path, self.role) {
            Entitlement::Unlisted => self.matrix.entitlement(path_root(path), self.role),
            decided => decided,
        }
    }
}
