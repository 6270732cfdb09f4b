//! Text normalisation and similarity scoring.
//!
//! Every comparison in the pipeline goes through these helpers so that the
//! cutoffs in [`crate::config::Thresholds`] always mean the same thing.

use crate::bibtex::escape::unescape_latex;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static LATEX_COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-zA-Z]+\s*").expect("valid regex"));
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

const KEYWORD_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "na", "no", "em", "da", "do",
    "de", "dos", "das", "para", "com", "por", "e", "o", "os", "um", "uma", "ao", "aos", "se",
    "sobre", "entre", "study", "analysis", "using", "based", "case", "research", "paper",
    "article",
];

/// Lowercase, decode accent macros, drop other LaTeX commands, braces and
/// punctuation, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let text = unescape_latex(text);
    let text = LATEX_COMMAND_RE.replace_all(&text, "");
    let text: String = text
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .collect();
    let lowered = text.to_lowercase();
    let text = NON_WORD_RE.replace_all(&lowered, " ");
    collapse_whitespace(&text)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity ratio in `[0, 1]` between two raw strings, compared after
/// [`normalize_text`]. Empty input on either side scores zero.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Case-insensitive similarity used for byline names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Significant title words: longer than three characters and not stop words.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !KEYWORD_STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Jaccard index of the keyword sets of two texts.
pub fn keyword_overlap(a: &str, b: &str) -> f64 {
    let ka = extract_keywords(a);
    let kb = extract_keywords(b);
    if ka.is_empty() || kb.is_empty() {
        return 0.0;
    }
    let intersection = ka.intersection(&kb).count();
    let union = ka.union(&kb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
