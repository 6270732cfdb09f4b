//! Rendering a classified record into a [`BibEntry`].

use super::escape::{braces_balanced, escape_text, sentence_case};
use super::key::{base_key, KeyAllocator};
use crate::classify::entry_kind;
use crate::config::{BibtexConfig, PeerReviewMapping};
use crate::error::{CvError, Result};
use crate::record::{WorkRecord, WorkType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

static VOLUME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"volume=(\d+)").expect("valid regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"number=(\d+)").expect("valid regex"));

/// Keywords beyond this count are dropped.
const MAX_KEYWORDS: usize = 5;

/// BibTeX entry types produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Article,
    InCollection,
    InProceedings,
    Book,
    Unpublished,
    Misc,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::InCollection => "incollection",
            Self::InProceedings => "inproceedings",
            Self::Book => "book",
            Self::Unpublished => "unpublished",
            Self::Misc => "misc",
        }
    }

    /// Field that carries the venue name, if the kind has one.
    pub fn venue_field(&self) -> Option<&'static str> {
        match self {
            Self::Article => Some("journal"),
            Self::InCollection | Self::InProceedings => Some("booktitle"),
            Self::Book => Some("publisher"),
            Self::Misc => Some("howpublished"),
            Self::Unpublished => None,
        }
    }

    fn has_pages(&self) -> bool {
        matches!(self, Self::Article | Self::InCollection | Self::InProceedings)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished bibliography entry. Field values are already escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibEntry {
    pub kind: EntryKind,
    pub key: String,
    pub fields: Vec<(String, String)>,
}

impl BibEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// `@kind{key,\n  field = {value},\n  ...\n}` with no trailing comma.
    pub fn to_bibtex(&self) -> String {
        let mut out = format!("@{}{{{},\n", self.kind, self.key);
        let last = self.fields.len().saturating_sub(1);
        for (i, (name, value)) in self.fields.iter().enumerate() {
            out.push_str(&format!("  {} = {{{}}}", name, value));
            out.push_str(if i == last { "\n" } else { ",\n" });
        }
        out.push('}');
        out
    }
}

/// `Surname, Given Names`; single-token names unchanged; joined with ` and `.
pub fn format_authors(record: &WorkRecord) -> String {
    record
        .authors
        .iter()
        .filter_map(|a| {
            let tokens: Vec<&str> = a.display_name.split_whitespace().collect();
            match tokens.as_slice() {
                [] => None,
                [single] => Some(escape_text(single)),
                [given @ .., surname] => Some(format!(
                    "{}, {}",
                    escape_text(surname),
                    escape_text(&given.join(" "))
                )),
            }
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Turns records into entries, keeping keys unique across one output.
pub struct BibRenderer<'a> {
    config: &'a BibtexConfig,
    peer_review: PeerReviewMapping,
    keys: KeyAllocator,
}

/// Result of rendering a batch.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub entries: Vec<BibEntry>,
    /// Records with no title after cleaning
    pub skipped: usize,
    /// Records that failed to render, by input index
    pub failed: Vec<(usize, String)>,
}

impl<'a> BibRenderer<'a> {
    pub fn new(config: &'a BibtexConfig, peer_review: PeerReviewMapping) -> Self {
        Self::with_keys(config, peer_review, KeyAllocator::new())
    }

    /// Renderer whose allocator already knows some keys (append mode).
    pub fn with_keys(
        config: &'a BibtexConfig,
        peer_review: PeerReviewMapping,
        keys: KeyAllocator,
    ) -> Self {
        Self {
            config,
            peer_review,
            keys,
        }
    }

    /// Render one record. `Ok(None)` means there was no title to render.
    pub fn render(&mut self, record: &WorkRecord) -> Result<Option<BibEntry>> {
        let title = if self.config.sentence_case_titles {
            escape_text(&sentence_case(&record.title))
        } else {
            escape_text(&record.title)
        };
        if title.is_empty() {
            return Ok(None);
        }

        let kind = entry_kind(record.work_type, self.peer_review);
        let mut entry = BibEntry {
            kind,
            key: String::new(),
            fields: Vec::new(),
        };

        let authors = format_authors(record);
        entry.set("author", if authors.is_empty() { "Unknown".to_string() } else { authors });
        entry.set("title", title);
        entry.set(
            "year",
            record
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );

        if let (Some(field), Some(venue)) = (kind.venue_field(), record.venue.as_deref()) {
            entry.set(field, escape_text(venue));
        }

        if kind == EntryKind::Article {
            let combined = record.biblio.volume_issue();
            if let Some(v) = VOLUME_RE.captures(&combined).and_then(|c| c.get(1)) {
                entry.set("volume", v.as_str());
            }
            if let Some(n) = NUMBER_RE.captures(&combined).and_then(|c| c.get(1)) {
                entry.set("number", n.as_str());
            }
        }

        if kind.has_pages() {
            let first = record.biblio.first_page.as_deref().unwrap_or("").trim();
            let last = record.biblio.last_page.as_deref().unwrap_or("").trim();
            match (first.is_empty(), last.is_empty()) {
                (false, false) => entry.set("pages", format!("{}--{}", first, last)),
                (false, true) => entry.set("pages", first),
                _ => {}
            }
        }

        match record.doi.as_deref().filter(|d| !d.is_empty()) {
            Some(doi) => entry.set("doi", doi),
            None => {
                if let Some(url) = record.url.as_deref() {
                    entry.set("url", url.trim());
                }
            }
        }

        match record.work_type {
            WorkType::Dataset => {
                entry.set("keywords", "dataset");
                entry.set("note", "Research Dataset");
            }
            WorkType::PeerReview | WorkType::Review => entry.set("keywords", "review"),
            _ if !matches!(kind, EntryKind::Misc | EntryKind::Unpublished) => {
                let keywords = record
                    .keywords
                    .iter()
                    .map(|k| escape_text(k))
                    .filter(|k| !k.is_empty())
                    .take(MAX_KEYWORDS)
                    .collect::<Vec<_>>()
                    .join(", ");
                entry.set("keywords", keywords);
            }
            _ => {}
        }

        if record.open_access && entry.field("note").is_none() {
            entry.set("note", "Open Access");
        }

        if let Some((name, _)) = entry.fields.iter().find(|(_, v)| !braces_balanced(v)) {
            return Err(CvError::Render(format!(
                "unbalanced braces in field '{}' of '{}'",
                name,
                record.short_title()
            )));
        }

        entry.key = self.keys.allocate(&base_key(record));
        debug!(key = %entry.key, kind = %entry.kind, "Rendered entry");
        Ok(Some(entry))
    }

    /// Render a batch. A failing record is logged with its index and skipped.
    pub fn render_all(&mut self, records: &[WorkRecord]) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        for (idx, record) in records.iter().enumerate() {
            match self.render(record) {
                Ok(Some(entry)) => outcome.entries.push(entry),
                Ok(None) => {
                    debug!(index = idx, "Skipping record without title");
                    outcome.skipped += 1;
                }
                Err(e) => {
                    warn!(index = idx, error = %e, "Failed to render record");
                    outcome.failed.push((idx, e.to_string()));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuthorRef, Biblio, Source};

    fn article() -> WorkRecord {
        let mut r = WorkRecord::new("Open Source AI Governance", Source::Openalex);
        r.work_type = WorkType::Article;
        r.year = Some(2021);
        r.venue = Some("Journal of Information Systems & Technology".into());
        r.doi = Some("10.1/x".into());
        r.url = Some("https://example.org/x".into());
        r.authors = vec![
            AuthorRef::named("Carlos Denner dos Santos"),
            AuthorRef::named("Plato"),
        ];
        r.biblio = Biblio {
            volume: Some("12".into()),
            issue: Some("3".into()),
            first_page: Some("10".into()),
            last_page: Some("20".into()),
        };
        r.keywords = (1..=7).map(|i| format!("kw{}", i)).collect();
        r.open_access = true;
        r
    }

    #[test]
    fn test_render_article_fields() -> Result<()> {
        let config = BibtexConfig::default();
        let mut renderer = BibRenderer::new(&config, PeerReviewMapping::Article);
        let entry = renderer.render(&article())?.expect("entry");

        assert_eq!(entry.kind, EntryKind::Article);
        assert_eq!(entry.key, "santos2021open");
        assert_eq!(entry.field("author"), Some("Santos, Carlos Denner dos and Plato"));
        assert_eq!(entry.field("title"), Some("Open source AI governance"));
        assert_eq!(
            entry.field("journal"),
            Some("Journal of Information Systems \\& Technology")
        );
        assert_eq!(entry.field("volume"), Some("12"));
        assert_eq!(entry.field("number"), Some("3"));
        assert_eq!(entry.field("pages"), Some("10--20"));
        assert_eq!(entry.field("doi"), Some("10.1/x"));
        assert_eq!(entry.field("url"), None);
        assert_eq!(entry.field("keywords"), Some("kw1, kw2, kw3, kw4, kw5"));
        assert_eq!(entry.field("note"), Some("Open Access"));
        assert_eq!(entry.field("booktitle"), None);
        Ok(())
    }

    #[test]
    fn test_to_bibtex_shape() -> Result<()> {
        let config = BibtexConfig::default();
        let mut renderer = BibRenderer::new(&config, PeerReviewMapping::Article);
        let text = renderer.render(&article())?.expect("entry").to_bibtex();
        assert!(text.starts_with("@article{santos2021open,\n  author = {"));
        assert!(text.ends_with("  note = {Open Access}\n}"));
        assert!(!text.contains(",\n}"));
        Ok(())
    }

    #[test]
    fn test_dataset_and_preprint_shapes() -> Result<()> {
        let config = BibtexConfig::default();
        let mut renderer = BibRenderer::new(&config, PeerReviewMapping::Article);
        let first = renderer.render(&article())?.expect("entry");
        assert_eq!(first.key, "santos2021open");

        let mut dataset = article();
        dataset.work_type = WorkType::Dataset;
        let entry = renderer.render(&dataset)?.expect("entry");
        assert_eq!(entry.kind, EntryKind::Misc);
        assert_eq!(entry.field("keywords"), Some("dataset"));
        assert_eq!(entry.field("note"), Some("Research Dataset"));
        assert!(entry.field("howpublished").is_some());
        assert_eq!(entry.field("volume"), None);
        assert_eq!(entry.key, "santos2021open2");

        let mut preprint = article();
        preprint.work_type = WorkType::Preprint;
        preprint.doi = None;
        let entry = renderer.render(&preprint)?.expect("entry");
        assert_eq!(entry.kind, EntryKind::Unpublished);
        assert_eq!(entry.field("url"), Some("https://example.org/x"));
        assert_eq!(entry.field("keywords"), None);
        Ok(())
    }

    #[test]
    fn test_peer_review_mapping_is_configurable() -> Result<()> {
        let config = BibtexConfig::default();
        let mut review = article();
        review.work_type = WorkType::PeerReview;

        let entry = BibRenderer::new(&config, PeerReviewMapping::Article)
            .render(&review)?
            .expect("entry");
        assert_eq!(entry.kind, EntryKind::Article);
        assert_eq!(entry.field("keywords"), Some("review"));

        let entry = BibRenderer::new(&config, PeerReviewMapping::Misc)
            .render(&review)?
            .expect("entry");
        assert_eq!(entry.kind, EntryKind::Misc);
        Ok(())
    }

    #[test]
    fn test_untitled_is_skipped_and_bad_record_does_not_abort() {
        let config = BibtexConfig::default();
        let mut renderer = BibRenderer::new(&config, PeerReviewMapping::Article);

        let untitled = WorkRecord::new("<b></b>", Source::Openalex);
        let mut broken = article();
        broken.venue = Some("Broken {venue".into());

        let outcome = renderer.render_all(&[untitled, broken, article()]);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 1);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].key, "santos2021open");
    }

    #[test]
    fn test_format_authors() {
        let mut r = WorkRecord::new("T", Source::Openalex);
        r.authors = vec![AuthorRef::named("João Silva"), AuthorRef::named("  ")];
        assert_eq!(format_authors(&r), "Silva, Jo{\\~a}o");
    }
}
