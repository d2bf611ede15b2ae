//! PII detector registry.
//!
//! Each detector is an independent object over `{name, find, strategy}`;
//! adding a detector never touches existing ones. Scanning visits every
//! string-typed field at any nesting depth, regardless of whether the
//! schema marks the field sensitive (defense against mislabeled schemas).

use std::collections::BTreeMap;

use regex::Regex;
use tracing::trace;

use phi_model::{FieldValue, MaskStrategy, PiiPattern, Record, child_path, index_path};

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("invalid detector pattern {name:?}: {message}")]
    InvalidPattern { name: String, message: String },
    #[error("duplicate detector name {0:?}")]
    DuplicateDetector(String),
}

/// Byte range of a match within a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A single detector: a named matching rule plus the masking strategy the
/// access filter applies when the match may not pass through.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn strategy(&self) -> MaskStrategy;
    fn find(&self, text: &str) -> Vec<Span>;
}

/// Regex-backed detector, the common case.
pub struct RegexDetector {
    name: String,
    regex: Regex,
    strategy: MaskStrategy,
}

impl RegexDetector {
    pub fn from_pattern(pattern: &PiiPattern) -> Result<Self, RedactError> {
        let regex = Regex::new(&pattern.pattern).map_err(|e| RedactError::InvalidPattern {
            name: pattern.name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: pattern.name.clone(),
            regex,
            strategy: pattern.strategy,
        })
    }
}

impl Detector for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> MaskStrategy {
        self.strategy
    }

    fn find(&self, text: &str) -> Vec<Span> {
        self.regex
            .find_iter(text)
            .map(|m| Span {
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }
}

/// All matches of one detector within one field value.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: String,
    pub strategy: MaskStrategy,
    pub spans: Vec<Span>,
}

/// Scan result: field path -> matches, ordered by path and pattern name
/// so output is independent of detector registration order.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    by_path: BTreeMap<String, Vec<PatternMatch>>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&[PatternMatch]> {
        self.by_path.get(path).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    /// Sorted, de-duplicated names of every matched pattern.
    pub fn pattern_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_path
            .values()
            .flatten()
            .map(|m| m.pattern.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Registry of detectors applied to every scanned field.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured pattern definitions.
    pub fn from_patterns(patterns: &[PiiPattern]) -> Result<Self, RedactError> {
        let mut registry = Self::new();
        for pattern in patterns {
            registry.register(Box::new(RegexDetector::from_pattern(pattern)?))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) -> Result<(), RedactError> {
        if self.detectors.iter().any(|d| d.name() == detector.name()) {
            return Err(RedactError::DuplicateDetector(detector.name().to_string()));
        }
        self.detectors.push(detector);
        // Keep iteration order stable regardless of registration order.
        self.detectors.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(())
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Scan every string field of the record. All matching detectors are
    /// recorded per field, not just the first.
    pub fn scan(&self, record: &Record) -> Findings {
        let mut findings = Findings::default();
        for (name, value) in &record.fields {
            self.scan_value(&child_path("", name), value, &mut findings);
        }
        trace!(
            record_id = %record.record_id,
            fields = findings.by_path.len(),
            "pii scan complete"
        );
        findings
    }

    fn scan_value(&self, path: &str, value: &FieldValue, findings: &mut Findings) {
        match value {
            FieldValue::String(text) => {
                let mut matches = Vec::new();
                for detector in &self.detectors {
                    let spans = detector.find(text);
                    if !spans.is_empty() {
                        matches.push(PatternMatch {
                            pattern: detector.name().to_string(),
                            strategy: detector.strategy(),
                            spans,
                        });
                    }
                }
                if !matches.is_empty() {
                    findings.by_path.insert(path.to_string(), matches);
                }
            }
            FieldValue::Object(children) => {
                for (name, child) in children {
                    self.scan_value(&child_path(path, name), child, findings);
                }
            }
            FieldValue::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    self.scan_value(&index_path(path, idx), item, findings);
                }
            }
            FieldValue::Null | FieldValue::Number(_) | FieldValue::Encrypted(_) => {}
        }
    }
}
