//! Date format checks for `date`-typed schema fields.

use regex::Regex;

/// Basic ISO 8601 validation (date or datetime).
///
/// Calendar dates and datetimes only; bare years and year-months are not
/// accepted for health record date fields.
pub fn is_valid_iso8601(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }

    let forms = [
        r"^\d{4}-\d{2}-\d{2}$",                                  // YYYY-MM-DD
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}$",                      // YYYY-MM-DDTHH:MM
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$",                // YYYY-MM-DDTHH:MM:SS
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+$",           // fractional seconds
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$",               // UTC suffix
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2}$", // with offset
    ];

    forms.iter().any(|form| {
        Regex::new(form)
            .map(|r| r.is_match(trimmed))
            .unwrap_or(false)
    })
}
