//! Locality-name synonym table.
//!
//! Maps common locality abbreviations to their canonical expanded forms.
//! Applied symmetrically to reference names at table build time and to
//! query names at lookup time, so that "St Kilda" matches "Saint Kilda"
//! and "Mt Eliza" matches "Mount Eliza".

use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Maps locality abbreviations to their canonical full form.
static LOCALITY_TERMS: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        ("mt", "mount"),
        ("mtn", "mountain"),
        ("st", "saint"),
        ("nth", "north"),
        ("sth", "south"),
        ("pt", "point"),
        ("hts", "heights"),
        ("jct", "junction"),
        ("lwr", "lower"),
        ("upr", "upper"),
    ])
});

/// Expands a single token to its canonical form, or returns it unchanged.
#[must_use]
pub fn expand_token(token: &str) -> &str {
    LOCALITY_TERMS.get(token).copied().unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_abbreviations() {
        assert_eq!(expand_token("mt"), "mount");
        assert_eq!(expand_token("st"), "saint");
        assert_eq!(expand_token("nth"), "north");
    }

    #[test]
    fn passes_through_unknown_tokens() {
        assert_eq!(expand_token("kilda"), "kilda");
        assert_eq!(expand_token(""), "");
    }
}
