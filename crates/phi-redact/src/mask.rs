//! Masking strategy application.

use sha2::{Digest, Sha256};

use phi_model::MaskStrategy;

use crate::detector::{PatternMatch, Span};

/// Marker emitted when an entire field value is withheld.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Stable pseudonymous token for a value: keyed digest of the per-run
/// salt and the original value, not reversible without the salt.
pub fn token_for(value: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    format!("tok_{}", hex::encode(&digest[..8]))
}

/// Mask one matched span according to its strategy.
fn mask_span(strategy: MaskStrategy, text: &str, salt: &[u8]) -> String {
    match strategy {
        MaskStrategy::Redact => mask_alnum(text, 0),
        MaskStrategy::PartialReveal { reveal_last } => mask_alnum(text, reveal_last),
        MaskStrategy::Tokenize => token_for(text, salt),
    }
}

/// Replace alphanumerics with `*`, keeping separators, optionally
/// revealing the trailing `reveal_last` alphanumerics
/// (`123-45-6789` -> `***-**-****`).
fn mask_alnum(text: &str, reveal_last: usize) -> String {
    let alnum_total = text.chars().filter(|c| c.is_ascii_alphanumeric()).count();
    let mask_until = alnum_total.saturating_sub(reveal_last);
    let mut seen = 0usize;
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                seen += 1;
                if seen <= mask_until { '*' } else { c }
            } else {
                c
            }
        })
        .collect()
}

/// Apply every match's strategy to a field value, replacing spans from
/// the end so earlier offsets stay valid. Overlapping spans are masked
/// once, by the first pattern in name order.
pub fn mask_text(value: &str, matches: &[PatternMatch], salt: &[u8]) -> String {
    let mut spans: Vec<(Span, MaskStrategy)> = Vec::new();
    for m in matches {
        for span in &m.spans {
            spans.push((*span, m.strategy));
        }
    }
    spans.sort_by_key(|(span, _)| (span.start, span.end));

    let mut kept: Vec<(Span, MaskStrategy)> = Vec::new();
    for (span, strategy) in spans {
        match kept.last() {
            Some((prev, _)) if span.start < prev.end => {} // overlap, already masked
            _ => kept.push((span, strategy)),
        }
    }

    let mut out = value.to_string();
    for (span, strategy) in kept.iter().rev() {
        let masked = mask_span(*strategy, &value[span.start..span.end], salt);
        out.replace_range(span.start..span.end, &masked);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use phi_model::MaskStrategy;

    fn single(pattern: &str, strategy: MaskStrategy, start: usize, end: usize) -> PatternMatch {
        PatternMatch {
            pattern: pattern.to_string(),
            strategy,
            spans: vec![Span { start, end }],
        }
    }

    #[test]
    fn redact_keeps_separators() {
        let text = "SSN 123-45-6789";
        let masked = mask_text(text, &[single("ssn", MaskStrategy::Redact, 4, 15)], b"salt");
        assert_eq!(masked, "SSN ***-**-****");
    }

    #[test]
    fn partial_reveal_keeps_bounded_suffix() {
        let text = "call 555-867-5309";
        let masked = mask_text(
            text,
            &[single(
                "phone",
                MaskStrategy::PartialReveal { reveal_last: 4 },
                5,
                17,
            )],
            b"salt",
        );
        assert_eq!(masked, "call ***-***-5309");
    }

    #[test]
    fn tokenize_is_stable_per_salt() {
        let a = token_for("MRN123456", b"salt-a");
        let b = token_for("MRN123456", b"salt-a");
        let c = token_for("MRN123456", b"salt-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("tok_"));
        assert_eq!(a.len(), 4 + 16);
    }

    #[test]
    fn overlapping_spans_masked_once() {
        let text = "ab123456cd";
        let matches = vec![
            single("one", MaskStrategy::Redact, 2, 8),
            single("two", MaskStrategy::Redact, 4, 10),
        ];
        let masked = mask_text(text, &matches, b"salt");
        assert_eq!(masked, "ab******cd");
    }

    #[test]
    fn masking_masked_text_is_a_no_op() {
        let masked = mask_alnum("123-45-6789", 0);
        assert_eq!(mask_alnum(&masked, 0), masked);
    }

    proptest::proptest! {
        #[test]
        fn redact_is_idempotent_on_any_text(text in ".{0,64}") {
            let once = mask_alnum(&text, 0);
            proptest::prop_assert_eq!(mask_alnum(&once, 0), once.clone());
        }

        #[test]
        fn tokens_never_leak_source_bytes(value in "[g-z][A-Za-z0-9]{3,23}") {
            let token = token_for(&value, b"run-salt");
            proptest::prop_assert!(token.starts_with("tok_"));
            proptest::prop_assert!(!token.contains(&value));
        }
    }
}
