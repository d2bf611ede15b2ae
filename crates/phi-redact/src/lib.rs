//! PII detection and enforcement.
//!
//! Detection (`detector`) and enforcement (`filter`) are deliberately
//! separated: the detector only reports findings, and the access filter
//! decides what to mask using the permission matrix. This lets detection
//! be audited independently of enforcement.

pub mod detector;
pub mod filter;
pub mod mask;
pub mod patterns;

pub use detector::{Detector, DetectorRegistry, Findings, PatternMatch, RedactError, Span};
pub use filter::{AccessFilter, RedactionAction};
pub use mask::{REDACTED_MARKER, mask_text, token_for};
pub use patterns::default_patterns;
