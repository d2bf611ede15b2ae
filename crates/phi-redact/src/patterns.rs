//! Built-in detector set, used when a run configuration declares no
//! patterns of its own.

use phi_model::{MaskStrategy, PiiPattern};

/// Default detectors for common US health-record identifiers.
pub fn default_patterns() -> Vec<PiiPattern> {
    vec![
        PiiPattern {
            name: "ssn".to_string(),
            pattern: r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
            strategy: MaskStrategy::Redact,
        },
        PiiPattern {
            name: "email".to_string(),
            pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
            strategy: MaskStrategy::Redact,
        },
        PiiPattern {
            name: "phone".to_string(),
            pattern: r"\b\d{3}[-.]\d{3}[-.]\d{4}\b".to_string(),
            strategy: MaskStrategy::PartialReveal { reveal_last: 4 },
        },
        PiiPattern {
            name: "mrn".to_string(),
            pattern: r"\bMRN\d{6,10}\b".to_string(),
            strategy: MaskStrategy::Tokenize,
        },
    ]
}
