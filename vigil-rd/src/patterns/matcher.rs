//! Pattern Matcher
//!
//! Stateless matching of utterance text against a pinned taxonomy snapshot.
//!
//! # Matching policy
//! 1. **Exact:** normalized phrase found in normalized text on word
//!    boundaries → confidence 1.0
//! 2. **Fuzzy:** for entries without an exact hit, every text window with the
//!    phrase's token count is scored as the mean per-token normalized
//!    Damerau-Levenshtein similarity of light-stemmed tokens; the best window
//!    at or above the threshold (default 0.85) matches with that confidence
//!
//! Overlapping matches are all retained; combining them is the risk
//! aggregator's job. Output is ordered severity desc, confidence desc,
//! pattern_id asc.

use super::normalize::{contains_phrase, normalize_text, stemmed_tokens};
use super::taxonomy::{CompiledEntry, CompiledPhrase, TaxonomySnapshot};
use crate::types::PatternMatch;
use std::cmp::Ordering;
use tracing::debug;

/// Phrases shorter than this (normalized characters) are matched exactly only
const MIN_FUZZY_PHRASE_CHARS: usize = 4;

/// Tokens up to this length must contain the same letters to match fuzzily
const SHORT_TOKEN_CHARS: usize = 4;

/// Taxonomy matcher
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    /// Minimum similarity for fuzzy matches (default 0.85)
    fuzzy_threshold: f64,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(0.85)
    }
}

impl PatternMatcher {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            fuzzy_threshold: fuzzy_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    /// Match `text` against every applicable entry of `snapshot`
    ///
    /// Empty text yields an empty result.
    pub fn match_text(
        &self,
        snapshot: &TaxonomySnapshot,
        text: &str,
        language: Option<&str>,
    ) -> Vec<PatternMatch> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Vec::new();
        }
        let text_stems = stemmed_tokens(&normalized);

        let mut matches: Vec<PatternMatch> = snapshot
            .entries()
            .iter()
            .filter(|entry| entry.applies_to(language))
            .filter_map(|entry| self.match_entry(entry, &normalized, &text_stems))
            .collect();

        matches.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });

        if !matches.is_empty() {
            debug!(
                match_count = matches.len(),
                top_pattern = %matches[0].pattern_id,
                top_severity = ?matches[0].severity,
                "Pattern matches found"
            );
        }

        matches
    }

    /// Best match of one entry (exact stage first, then fuzzy)
    fn match_entry(
        &self,
        entry: &CompiledEntry,
        normalized_text: &str,
        text_stems: &[String],
    ) -> Option<PatternMatch> {
        if let Some(phrase) = entry
            .phrases
            .iter()
            .find(|p| contains_phrase(normalized_text, &p.normalized))
        {
            return Some(build_match(entry, phrase, 1.0, true));
        }

        let mut best: Option<(&CompiledPhrase, f64)> = None;
        for phrase in &entry.phrases {
            if phrase.normalized.chars().count() < MIN_FUZZY_PHRASE_CHARS {
                continue;
            }
            let similarity = best_window_similarity(&phrase.stems, text_stems);
            if similarity >= self.fuzzy_threshold
                && best.map_or(true, |(_, current)| similarity > current)
            {
                best = Some((phrase, similarity));
            }
        }

        best.map(|(phrase, similarity)| build_match(entry, phrase, similarity, false))
    }
}

fn build_match(
    entry: &CompiledEntry,
    phrase: &CompiledPhrase,
    confidence: f64,
    exact: bool,
) -> PatternMatch {
    PatternMatch {
        pattern_id: entry.entry.pattern_id.clone(),
        pattern_type: entry.entry.pattern_type,
        severity: entry.entry.severity,
        confidence,
        phrase: phrase.original.clone(),
        exact,
        crisis_protocol: entry.entry.crisis_protocol.clone(),
    }
}

/// Highest mean token similarity over all windows of `text` sized like `phrase`
fn best_window_similarity(phrase: &[String], text: &[String]) -> f64 {
    let width = phrase.len();
    if width == 0 || text.len() < width {
        return 0.0;
    }

    text.windows(width)
        .map(|window| {
            let total: f64 = phrase
                .iter()
                .zip(window)
                .map(|(p, t)| token_similarity(p, t))
                .sum();
            total / width as f64
        })
        .fold(0.0, f64::max)
}

/// Similarity of two stemmed tokens
///
/// Short tokens (four characters or fewer) only tolerate reordering of the
/// same letters: a single substituted letter in a short word usually changes
/// its meaning ("kula" vs "kufa").
fn token_similarity(phrase_token: &str, text_token: &str) -> f64 {
    if phrase_token == text_token {
        return 1.0;
    }
    let longest = phrase_token.chars().count().max(text_token.chars().count());
    if longest <= SHORT_TOKEN_CHARS && !same_letters(phrase_token, text_token) {
        return 0.0;
    }
    strsim::normalized_damerau_levenshtein(phrase_token, text_token)
}

fn same_letters(a: &str, b: &str) -> bool {
    let mut a: Vec<char> = a.chars().collect();
    let mut b: Vec<char> = b.chars().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::taxonomy::PatternTaxonomyEntry;
    use crate::types::{PatternType, Severity};

    fn snapshot() -> TaxonomySnapshot {
        let entry = |id: &str, phrases: &[&str], lang: &str, ty, severity| PatternTaxonomyEntry {
            pattern_id: id.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            language: lang.to_string(),
            pattern_type: ty,
            severity,
            crisis_protocol: None,
        };

        TaxonomySnapshot::from_entries(
            "test",
            vec![
                entry("en-min-fine", &["I'm fine", "I am fine"], "en", PatternType::Minimization, Severity::Low),
                entry("en-hopeless", &["no point anymore"], "en", PatternType::Hopelessness, Severity::High),
                entry("en-burden", &["better off without me"], "en", PatternType::SuicidalIdeation, Severity::Critical),
                entry("sw-si", &["nataka kufa"], "sw", PatternType::SuicidalIdeation, Severity::Critical),
                entry("sw-min", &["niko sawa"], "sw", PatternType::Minimization, Severity::Low),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let matcher = PatternMatcher::default();
        assert!(matcher.match_text(&snapshot(), "", Some("en")).is_empty());
        assert!(matcher.match_text(&snapshot(), "   ?! ", None).is_empty());
    }

    #[test]
    fn test_exact_match_is_full_confidence() {
        let matcher = PatternMatcher::default();
        let matches = matcher.match_text(&snapshot(), "Honestly, I'm fine.", Some("en"));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_id, "en-min-fine");
        assert_eq!(matches[0].confidence, 1.0);
        assert!(matches[0].exact);
    }

    #[test]
    fn test_overlapping_matches_ranked_by_severity() {
        let matcher = PatternMatcher::default();
        let matches = matcher.match_text(
            &snapshot(),
            "I'm fine, there's just no point anymore, they'd be better off without me",
            Some("en"),
        );
        let ids: Vec<&str> = matches.iter().map(|m| m.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["en-burden", "en-hopeless", "en-min-fine"]);
    }

    #[test]
    fn test_fuzzy_tolerates_spelling_variation() {
        let matcher = PatternMatcher::default();
        let matches = matcher.match_text(&snapshot(), "im fien", Some("en"));
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].exact);
        assert!(matches[0].confidence >= 0.85 && matches[0].confidence < 1.0);
    }

    #[test]
    fn test_fuzzy_does_not_confuse_distinct_words() {
        let matcher = PatternMatcher::default();
        // "kula" (eat) must not match "kufa" (die)
        let matches = matcher.match_text(&snapshot(), "nataka kula sasa", Some("sw"));
        assert!(matches.iter().all(|m| m.pattern_id != "sw-si"));
    }

    #[test]
    fn test_critical_patterns_cross_language_hint() {
        let matcher = PatternMatcher::default();
        // English hint, Swahili disclosure
        let matches = matcher.match_text(&snapshot(), "nataka kufa", Some("en"));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_id, "sw-si");
        assert_eq!(matches[0].severity, Severity::Critical);

        // Non-critical Swahili entry is filtered by the English hint
        let matches = matcher.match_text(&snapshot(), "niko sawa", Some("en"));
        assert!(matches.is_empty());
        let matches = matcher.match_text(&snapshot(), "niko sawa", Some("sw"));
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_threshold_is_tunable() {
        let strict = PatternMatcher::new(0.99);
        assert!(strict.match_text(&snapshot(), "im fien", Some("en")).is_empty());
    }

    #[test]
    fn test_token_similarity_short_words() {
        assert_eq!(token_similarity("fine", "fien"), 0.75);
        assert_eq!(token_similarity("kufa", "kula"), 0.0);
        // Longer tokens tolerate a substitution
        assert!(token_similarity("nataka", "nataki") > 0.8);
    }

    #[test]
    fn test_window_similarity() {
        let phrase = vec!["nataka".to_string(), "kufa".to_string()];
        let text = vec!["leo".to_string(), "nataka".to_string(), "kufa".to_string()];
        assert_eq!(best_window_similarity(&phrase, &text), 1.0);
        assert_eq!(best_window_similarity(&phrase, &text[..1]), 0.0);
    }
}
