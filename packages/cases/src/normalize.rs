//! Region-name normalization and similarity scoring.
//!
//! Scraped case-data sources spell region names differently from the
//! boundary reference datasets (case, punctuation, abbreviations). Matching
//! runs both sides through the same deterministic normalization pipeline,
//! and falls back to a bigram similarity score when the normalized forms
//! still differ.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::synonyms;

/// Minimum similarity score for a fuzzy region-name match to be accepted.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Regex to strip punctuation characters that do not contribute to
/// name matching.
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,#'/\\\-()&]+").expect("valid regex"));

/// Normalizes a region name.
///
/// The pipeline:
/// 1. Lowercase
/// 2. Strip punctuation (`.`, `,`, `#`, `'`, `/`, `\`, `-`, `(`, `)`, `&`)
/// 3. Expand locality abbreviations (st→saint, mt→mount, etc.)
/// 4. Collapse whitespace and trim
#[must_use]
pub fn normalize(input: &str) -> String {
    let lower = input.to_lowercase();
    let no_punct = PUNCTUATION_RE.replace_all(&lower, " ");

    let expanded: Vec<&str> = no_punct
        .split_whitespace()
        .map(synonyms::expand_token)
        .collect();

    expanded.join(" ")
}

/// Similarity between two region names in `[0.0, 1.0]`.
///
/// Sørensen–Dice coefficient over character bigrams of the normalized
/// forms: 1.0 for names that normalize identically, 0.0 for names sharing
/// no bigrams. Deterministic and symmetric in its arguments.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }

    let a_bigrams = bigram_counts(&a);
    let b_bigrams = bigram_counts(&b);
    let a_total: usize = a_bigrams.values().sum();
    let b_total: usize = b_bigrams.values().sum();

    if a_total == 0 || b_total == 0 {
        return 0.0;
    }

    let shared: usize = a_bigrams
        .iter()
        .filter_map(|(bigram, &count)| b_bigrams.get(bigram).map(|&other| count.min(other)))
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let score = 2.0 * shared as f64 / (a_total + b_total) as f64;
    score
}

/// Character bigram multiset of a string.
fn bigram_counts(s: &str) -> BTreeMap<(char, char), usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut counts = BTreeMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_punctuation() {
        assert_eq!(normalize("COLAC-OTWAY"), "colac otway");
        assert_eq!(normalize("Colac Otway"), "colac otway");
    }

    #[test]
    fn expands_locality_abbreviations() {
        assert_eq!(normalize("St Kilda"), "saint kilda");
        assert_eq!(normalize("Mt Eliza"), "mount eliza");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  Port   Phillip "), "port phillip");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("St. Kilda East");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn identical_names_score_one() {
        assert!((similarity("Carlton", "CARLTON") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_is_symmetric() {
        let ab = similarity("Mornington Peninsula", "Mornington Peninsular");
        let ba = similarity("Mornington Peninsular", "Mornington Peninsula");
        assert!((ab - ba).abs() < f64::EPSILON);
        assert!(ab >= SIMILARITY_THRESHOLD);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(similarity("Carlton", "Richmond") < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn empty_names_score_zero() {
        assert!((similarity("", "") - 0.0).abs() < f64::EPSILON);
        assert!((similarity("Carlton", "") - 0.0).abs() < f64::EPSILON);
    }
}
