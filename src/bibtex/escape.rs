//! Text cleanup for BibTeX field values.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
/// `{\'a}`, `\'a`, `{\'{a}}`
static ACCENT_MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{?\\([`'^~"])\s*\{?([A-Za-z])\}?\}?"#).expect("valid regex")
});
/// `{\c c}`, `\c{c}`
static CEDILLA_MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{?\\c(?:\s+([A-Za-z])|\s*\{([A-Za-z])\})\}?").expect("valid regex")
});

/// Characters replaced by their LaTeX form.
const REPLACEMENTS: &[(char, &str)] = &[
    ('á', "{\\'a}"),
    ('à', "{\\`a}"),
    ('â', "{\\^a}"),
    ('ã', "{\\~a}"),
    ('é', "{\\'e}"),
    ('è', "{\\`e}"),
    ('ê', "{\\^e}"),
    ('í', "{\\'i}"),
    ('ì', "{\\`i}"),
    ('î', "{\\^i}"),
    ('ó', "{\\'o}"),
    ('ò', "{\\`o}"),
    ('ô', "{\\^o}"),
    ('õ', "{\\~o}"),
    ('ú', "{\\'u}"),
    ('ù', "{\\`u}"),
    ('û', "{\\^u}"),
    ('ü', "{\\\"u}"),
    ('ç', "{\\c c}"),
    ('Á', "{\\'A}"),
    ('À', "{\\`A}"),
    ('Â', "{\\^A}"),
    ('Ã', "{\\~A}"),
    ('É', "{\\'E}"),
    ('È', "{\\`E}"),
    ('Ê', "{\\^E}"),
    ('Í', "{\\'I}"),
    ('Ì', "{\\`I}"),
    ('Î', "{\\^I}"),
    ('Ó', "{\\'O}"),
    ('Ò', "{\\`O}"),
    ('Ô', "{\\^O}"),
    ('Õ', "{\\~O}"),
    ('Ú', "{\\'U}"),
    ('Ù', "{\\`U}"),
    ('Û', "{\\^U}"),
    ('Ü', "{\\\"U}"),
    ('Ç', "{\\c C}"),
    ('\u{2010}', "-"),
    ('\u{2013}', "--"),
    ('\u{2014}', "---"),
    ('\u{25A1}', ""),
];

/// Words kept as written when converting titles to sentence case.
const PRESERVE_CAPS: &[&str] = &[
    "AI", "IT", "API", "CRM", "TCO", "ORCID", "DOI", "IEEE", "ACM", "Brazil", "Brazilian",
    "Canada", "Canadian", "Wikipedia", "GitHub", "Python", "Java", "SQL", "COVID", "UQAM", "UnB",
    "USA", "UK", "OSS", "FLOSS", "IoT", "ML", "NLP", "ChatGPT", "GPT",
];

/// LaTeX specials escaped with a backslash unless one is already there.
const SPECIALS: &[char] = &['&', '%', '$', '#', '_'];

/// Strip HTML, flatten newlines (real and literal `\n`), collapse whitespace,
/// replace accented characters and escape bare `& % $ # _`.
///
/// Applying it twice gives the same result as applying it once.
pub fn escape_text(text: &str) -> String {
    let text = HTML_TAG_RE.replace_all(text, "");
    let text = text.replace("\\n", " ");

    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if let Some((_, replacement)) = REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            out.push_str(replacement);
        } else if SPECIALS.contains(&c) && prev != Some('\\') {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    crate::similarity::collapse_whitespace(&out)
}

/// Turn the accent macros [`escape_text`] produces (and their unbraced
/// spellings) back into characters. Unknown combinations keep the bare letter.
pub fn unescape_latex(text: &str) -> String {
    let text = CEDILLA_MACRO_RE.replace_all(text, |caps: &regex::Captures| {
        let letter = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        accented(&format!("{{\\c {}}}", letter)).unwrap_or_else(|| letter.to_string())
    });
    ACCENT_MACRO_RE
        .replace_all(&text, |caps: &regex::Captures| {
            let canonical = format!("{{\\{}{}}}", &caps[1], &caps[2]);
            accented(&canonical).unwrap_or_else(|| caps[2].to_string())
        })
        .into_owned()
}

fn accented(macro_form: &str) -> Option<String> {
    REPLACEMENTS
        .iter()
        .find(|(_, latex)| *latex == macro_form)
        .map(|(c, _)| c.to_string())
}

/// Sentence-case a title: first word capitalised; acronyms, listed proper
/// nouns and words with internal capitals kept; everything else lowercased.
pub fn sentence_case(title: &str) -> String {
    let title = HTML_TAG_RE.replace_all(title, "");
    title
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if let Some(kept) = preserved(word) {
                kept
            } else if i == 0 {
                capitalize(word)
            } else {
                word.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn preserved(word: &str) -> Option<String> {
    let upper = word.to_uppercase();
    if PRESERVE_CAPS.contains(&upper.as_str()) {
        return Some(upper);
    }
    if PRESERVE_CAPS.contains(&word) {
        return Some(word.to_string());
    }
    let all_caps = word.chars().count() > 1
        && word.chars().any(char::is_uppercase)
        && !word.chars().any(char::is_lowercase);
    let internal_caps = word.chars().skip(1).any(char::is_uppercase);
    (all_caps || internal_caps).then(|| word.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// True when every `{` has a matching `}` in order.
pub fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i64;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
