//! Schema validation for health records.
//!
//! Validation is collect-then-decide: every violation for a record is
//! gathered before the accept/reject decision, so the rejection detail
//! handed to the audit trail is complete.

pub mod format;
pub mod validator;

pub use format::is_valid_iso8601;
pub use validator::{
    SchemaValidator, ValidateError, ValidationOutcome, Violation, ViolationCode,
};
