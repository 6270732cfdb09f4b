//! Duplicate check against an existing bibliography.
//!
//! Append mode must not add a work the `.bib` file already holds under a
//! slightly different title (translations, preprint and published versions,
//! conference and journal versions). A candidate is a likely duplicate of an
//! existing entry when any rule in [`DuplicateRule`] fires.

use crate::bibtex::reader::ParsedEntry;
use crate::config::Thresholds;
use crate::record::{normalize_doi, WorkRecord};
use crate::similarity::{keyword_overlap, normalize_text, title_similarity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRule {
    SameDoi,
    TitleStrong,
    TitleWithAuthor,
    KeywordsWithAuthor,
    Combined,
    KeywordsOnly,
}

/// Why a candidate was matched to an existing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMatch {
    pub key: String,
    pub existing_title: String,
    pub title_similarity: f64,
    pub keyword_overlap: f64,
    pub author_match: bool,
    pub rule: DuplicateRule,
}

impl AuditMatch {
    pub fn confidence(&self) -> f64 {
        self.title_similarity.max(self.keyword_overlap)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    pub fresh: Vec<WorkRecord>,
    pub duplicates: Vec<(WorkRecord, AuditMatch)>,
}

/// Whether `surname` appears as a word in the normalised author text.
fn mentions_surname(authors: &str, surname: &str) -> bool {
    normalize_text(authors)
        .split_whitespace()
        .any(|word| word == surname)
}

pub struct BibAudit<'a> {
    thresholds: &'a Thresholds,
    surname: Option<String>,
}

impl<'a> BibAudit<'a> {
    /// `surname` is the target author's normalised surname; without one the
    /// author-dependent rules never fire.
    pub fn new(thresholds: &'a Thresholds, surname: Option<String>) -> Self {
        Self { thresholds, surname }
    }

    fn classify(&self, title_sim: f64, overlap: f64, author_match: bool) -> Option<DuplicateRule> {
        let t = self.thresholds;
        if title_sim >= t.audit_title_strong {
            Some(DuplicateRule::TitleStrong)
        } else if author_match && title_sim >= t.audit_title_with_author {
            Some(DuplicateRule::TitleWithAuthor)
        } else if author_match && overlap >= t.audit_keywords_with_author {
            Some(DuplicateRule::KeywordsWithAuthor)
        } else if title_sim >= t.audit_combined && overlap >= t.audit_combined {
            Some(DuplicateRule::Combined)
        } else if overlap >= t.audit_keywords_only {
            Some(DuplicateRule::KeywordsOnly)
        } else {
            None
        }
    }

    /// Compare one candidate with one existing entry.
    pub fn compare(&self, record: &WorkRecord, entry: &ParsedEntry) -> Option<AuditMatch> {
        let existing_title = entry.field("title").unwrap_or_default().to_string();
        let record_doi = record.doi.as_deref();
        let same_doi = record_doi.is_some()
            && entry.field("doi").and_then(normalize_doi).as_deref() == record_doi;

        let title_sim = title_similarity(&record.title, &existing_title);
        let overlap = keyword_overlap(&record.title, &existing_title);
        let author_match = match (&self.surname, entry.field("author")) {
            (Some(surname), Some(existing_authors)) => {
                let names: Vec<&str> = record
                    .authors
                    .iter()
                    .map(|a| a.display_name.as_str())
                    .collect();
                mentions_surname(&names.join(" "), surname)
                    && mentions_surname(existing_authors, surname)
            }
            _ => false,
        };

        let rule = if same_doi {
            Some(DuplicateRule::SameDoi)
        } else {
            self.classify(title_sim, overlap, author_match)
        }?;

        Some(AuditMatch {
            key: entry.key.clone(),
            existing_title,
            title_similarity: title_sim,
            keyword_overlap: overlap,
            author_match,
            rule,
        })
    }

    /// Strongest match for `record` among `entries`.
    pub fn find_duplicate(&self, record: &WorkRecord, entries: &[ParsedEntry]) -> Option<AuditMatch> {
        entries
            .iter()
            .filter_map(|entry| self.compare(record, entry))
            .max_by(|a, b| {
                let rank = |m: &AuditMatch| (m.rule == DuplicateRule::SameDoi, m.confidence());
                let (ra, rb) = (rank(a), rank(b));
                ra.0.cmp(&rb.0).then(ra.1.total_cmp(&rb.1))
            })
    }

    /// Split candidates into those safe to append and likely duplicates.
    pub fn audit(&self, records: Vec<WorkRecord>, entries: &[ParsedEntry]) -> AuditOutcome {
        let mut outcome = AuditOutcome::default();
        for record in records {
            match self.find_duplicate(&record, entries) {
                Some(found) => {
                    debug!(
                        title = %record.short_title(),
                        key = %found.key,
                        rule = ?found.rule,
                        "Already in bibliography"
                    );
                    outcome.duplicates.push((record, found));
                }
                None => outcome.fresh.push(record),
            }
        }
        info!(
            fresh = outcome.fresh.len(),
            duplicates = outcome.duplicates.len(),
            "Bibliography audit complete"
        );
        outcome
    }
}
