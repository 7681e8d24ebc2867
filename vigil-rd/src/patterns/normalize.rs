//! Text normalization shared by taxonomy compilation and matching
//!
//! Both phrases and utterance text go through the same pipeline so that exact
//! matching is a plain word-boundary substring test on normalized strings.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize text for matching
///
/// NFKD decomposition, combining marks dropped, lowercased, apostrophes
/// removed ("I'm" → "im"), every other non-alphanumeric character replaced by
/// a space, whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfkd() {
        if is_combining_mark(c) || matches!(c, '\'' | '\u{2019}' | '`') {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Strip a common inflectional suffix from a normalized token
///
/// Deliberately light: only tokens longer than four characters are touched,
/// so short function words stay intact.
pub fn light_stem(token: &str) -> &str {
    if token.chars().count() <= 4 {
        return token;
    }
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.chars().count() >= 3 {
                return stem;
            }
        }
    }
    token
}

/// Normalized, stemmed tokens of `normalized` text
pub fn stemmed_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| light_stem(t).to_string())
        .collect()
}

/// True when `needle` occurs in `haystack` on word boundaries (both normalized)
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let padded_haystack = format!(" {} ", haystack);
    let padded_needle = format!(" {} ", needle);
    padded_haystack.contains(&padded_needle)
}
