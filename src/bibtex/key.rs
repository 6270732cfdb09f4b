//! Citation key generation.

use crate::record::WorkRecord;
use std::collections::HashSet;

/// Longest base key before any collision suffix.
pub const MAX_KEY_LEN: usize = 30;

/// Title words never used for the key.
const KEY_STOPWORDS: &[&str] = &["a", "an", "the", "of", "in", "on", "at", "to", "for", "and", "or"];

/// First title word longer than three characters that is not a stopword.
fn key_word(title: &str) -> Option<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| w.chars().count() > 3 && !KEY_STOPWORDS.contains(w))
        .map(str::to_string)
}

/// `surname + year + first four letters of the first significant title word`,
/// restricted to `[a-z0-9]` and capped at [`MAX_KEY_LEN`].
///
/// Missing parts fall back to `unknown`, `xxxx` and `work`.
pub fn base_key(record: &WorkRecord) -> String {
    let surname = record
        .authors
        .first()
        .and_then(|a| a.display_name.split_whitespace().last())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string());

    let year = record
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "xxxx".to_string());

    let title_part: String = key_word(&record.title)
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                .take(4)
                .collect()
        })
        .unwrap_or_default();
    let title_part = if title_part.is_empty() {
        "work".to_string()
    } else {
        title_part
    };

    format!("{}{}{}", surname, year, title_part)
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(MAX_KEY_LEN)
        .collect()
}

/// Hands out keys that are unique within one output file.
///
/// The first request for a base key gets it unchanged; later requests get
/// `base2`, `base3`, ... Keys already present in an existing file can be
/// reserved up front so appended entries never collide with them.
#[derive(Debug, Default, Clone)]
pub struct KeyAllocator {
    used: HashSet<String>,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            used: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allocate(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.used.contains(key)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
