//! Free-text artist matching.
//!
//! Both the submitted guess and every accepted artist name go through the same
//! normalization pipeline before they are compared, first for equality and then
//! with a Levenshtein-based similarity ratio. The round builder reuses
//! [`normalize_artist`] so that deck uniqueness and answer matching agree on
//! which spellings name the same artist.

use std::collections::HashMap;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Similarity ratio a guess must reach when it is not an exact normalized match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Markers removed wherever they appear because they only flag collaborations.
/// "featuring" comes first so that "feat." never eats part of it.
const FEATURING_MARKERS: [&str; 3] = ["featuring", "feat.", "ft."];

/// Characters treated as word separators.
const SEPARATORS: [char; 5] = ['&', '(', ')', '[', ']'];

/// Built-in shorthand accepted in place of the full artist name.
const BUILTIN_ALIASES: [(&str, &str); 3] = [
    ("gnr", "guns n roses"),
    ("mj", "michael jackson"),
    ("t-swift", "taylor swift"),
];

/// Lowercase, strip diacritics, drop a leading "the", collapse separators and
/// featuring markers, and squeeze whitespace.
pub fn normalize_artist(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let folded: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let trimmed = folded.trim();
    let without_article = trimmed.strip_prefix("the ").unwrap_or(trimmed);

    let unmarked = FEATURING_MARKERS
        .iter()
        .fold(without_article.replace(SEPARATORS, " "), |text, marker| {
            text.replace(*marker, " ")
        });

    unmarked
        .split_whitespace()
        .filter(|token| *token != "and")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity ratio in `[0, 1]` derived from the character-level edit distance.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// Case-insensitive lookup table resolving shorthand guesses to canonical names.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    /// Table holding only the aliases shipped with the binary.
    pub fn builtin() -> Self {
        Self::from_pairs(
            BUILTIN_ALIASES
                .iter()
                .map(|(alias, name)| (alias.to_string(), name.to_string())),
        )
    }

    /// Build a table from `(alias, canonical name)` pairs; later pairs win.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(alias, name)| (alias.trim().to_lowercase(), name))
            .collect();
        Self { entries }
    }

    /// Add or replace entries, keeping the existing ones.
    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        self.entries.extend(
            pairs
                .into_iter()
                .map(|(alias, name)| (alias.trim().to_lowercase(), name)),
        );
    }

    /// Return the canonical name for `text` when it is a known alias.
    pub fn resolve<'a>(&'a self, text: &'a str) -> &'a str {
        self.entries
            .get(&text.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(text)
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Answer classifier bundling the alias table and similarity threshold.
#[derive(Debug, Clone)]
pub struct AnswerMatcher {
    aliases: AliasTable,
    threshold: f64,
}

impl AnswerMatcher {
    /// Create a matcher with an explicit alias table and threshold.
    pub fn new(aliases: AliasTable, threshold: f64) -> Self {
        Self { aliases, threshold }
    }

    /// Whether `submitted` names one of the `accepted` artists.
    pub fn is_match<S: AsRef<str>>(&self, submitted: &str, accepted: &[S]) -> bool {
        let guess = normalize_artist(self.aliases.resolve(submitted));
        if guess.is_empty() {
            return false;
        }

        accepted.iter().any(|candidate| {
            let candidate = normalize_artist(candidate.as_ref());
            !candidate.is_empty()
                && (candidate == guess || similarity(&candidate, &guess) >= self.threshold)
        })
    }
}

impl Default for AnswerMatcher {
    fn default() -> Self {
        Self::new(AliasTable::builtin(), DEFAULT_MATCH_THRESHOLD)
    }
}

/// Match against the built-in alias table with a custom threshold.
pub fn is_match<S: AsRef<str>>(submitted: &str, accepted: &[S], threshold: f64) -> bool {
    AnswerMatcher::new(AliasTable::builtin(), threshold).is_match(submitted, accepted)
}
