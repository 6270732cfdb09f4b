//! Work records shared by every pipeline stage.
//!
//! A [`WorkRecord`] is created by a source parser, annotated by the validator,
//! collapsed by the merger/deduplicator, retyped by the classifier and finally
//! rendered into a BibTeX entry. Each stage produces a new snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detected publication type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkType {
    #[serde(alias = "journal-article")]
    Article,
    #[serde(alias = "posted-content")]
    Preprint,
    BookChapter,
    Dataset,
    Review,
    Editorial,
    PeerReview,
    #[serde(alias = "conference-paper")]
    ProceedingsArticle,
    Book,
    #[default]
    #[serde(other)]
    Unknown,
}

impl WorkType {
    /// Map a raw source label onto a work type. Unrecognised labels become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "article" | "journal-article" | "journal article" => Self::Article,
            "preprint" | "posted-content" => Self::Preprint,
            "book-chapter" | "incollection" | "chapter" => Self::BookChapter,
            "dataset" => Self::Dataset,
            "review" => Self::Review,
            "editorial" => Self::Editorial,
            "peer-review" => Self::PeerReview,
            "proceedings-article" | "inproceedings" | "conference-paper" => {
                Self::ProceedingsArticle
            }
            "book" => Self::Book,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Preprint => "preprint",
            Self::BookChapter => "book-chapter",
            Self::Dataset => "dataset",
            Self::Review => "review",
            Self::Editorial => "editorial",
            Self::PeerReview => "peer-review",
            Self::ProceedingsArticle => "proceedings-article",
            Self::Book => "book",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external service a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Openalex,
    Lattes,
    Crossref,
    Orcid,
    Scholar,
    Researchgate,
}

/// A concrete input feed. Scholar and ResearchGate each have two feeds with
/// different reliability, so merge priority is defined per feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    OpenAlex,
    Lattes,
    ScholarBibtex,
    ScholarHtml,
    ResearchGateCsv,
    ResearchGateHtml,
    Crossref,
    Orcid,
}

impl Feed {
    /// Feeds that contribute records to the merge, highest priority first.
    pub const MERGE_ORDER: [Feed; 6] = [
        Feed::OpenAlex,
        Feed::Lattes,
        Feed::ScholarBibtex,
        Feed::ScholarHtml,
        Feed::ResearchGateCsv,
        Feed::ResearchGateHtml,
    ];

    /// Lower is better.
    pub fn priority(&self) -> usize {
        Self::MERGE_ORDER
            .iter()
            .position(|f| f == self)
            .unwrap_or(Self::MERGE_ORDER.len())
    }

    pub fn source(&self) -> Source {
        match self {
            Feed::OpenAlex => Source::Openalex,
            Feed::Lattes => Source::Lattes,
            Feed::ScholarBibtex | Feed::ScholarHtml => Source::Scholar,
            Feed::ResearchGateCsv | Feed::ResearchGateHtml => Source::Researchgate,
            Feed::Crossref => Source::Crossref,
            Feed::Orcid => Source::Orcid,
        }
    }

    /// Snapshot file stem used under `sources/`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Feed::OpenAlex => "openalex",
            Feed::Lattes => "lattes",
            Feed::ScholarBibtex => "scholar_bibtex",
            Feed::ScholarHtml => "scholar_html",
            Feed::ResearchGateCsv => "researchgate_csv",
            Feed::ResearchGateHtml => "researchgate_html",
            Feed::Crossref => "crossref",
            Feed::Orcid => "orcid",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One byline entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub institutions: Vec<String>,
}

impl AuthorRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            display_name: name.into(),
            ..Default::default()
        }
    }
}

/// Volume/issue/page information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Biblio {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_page: Option<String>,
}

impl Biblio {
    pub fn is_empty(&self) -> bool {
        self.volume.is_none()
            && self.issue.is_none()
            && self.first_page.is_none()
            && self.last_page.is_none()
    }

    /// Combined `volume=V, number=N` string, empty when there is no volume.
    pub fn volume_issue(&self) -> String {
        let Some(volume) = self.volume.as_deref().filter(|v| !v.is_empty()) else {
            return String::new();
        };
        let mut combined = format!("volume={}", volume);
        if let Some(issue) = self.issue.as_deref().filter(|i| !i.is_empty()) {
            combined.push_str(&format!(", number={}", issue));
        }
        combined
    }
}

/// Outcome of the identity and content checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatus {
    pub orcid_verified: bool,
    pub content_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manually_approved: bool,
}

impl ValidationStatus {
    pub fn is_validated(&self) -> bool {
        self.orcid_verified && self.content_verified
    }
}

/// One candidate publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(rename = "type", default)]
    pub work_type: WorkType,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorRef>,
    #[serde(default)]
    pub citations: u64,
    #[serde(default)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funders: Vec<String>,
    #[serde(default, skip_serializing_if = "Biblio::is_empty")]
    pub biblio: Biblio,
    #[serde(default)]
    pub open_access: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<Feed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationStatus>,
}

impl WorkRecord {
    pub fn new(title: impl Into<String>, source: Source) -> Self {
        Self {
            title: title.into(),
            source,
            ..Default::default()
        }
    }

    pub fn has_doi(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Stable identity used by logs: the DOI when present, otherwise
    /// normalised title and year.
    pub fn identity(&self) -> String {
        match self.doi.as_deref().filter(|d| !d.is_empty()) {
            Some(doi) => format!("doi:{}", doi),
            None => format!(
                "title:{}|{}",
                crate::similarity::normalize_text(&self.title),
                self.year.map(|y| y.to_string()).unwrap_or_default()
            ),
        }
    }

    /// Short title for log lines.
    pub fn short_title(&self) -> &str {
        match self.title.char_indices().nth(60) {
            Some((idx, _)) => &self.title[..idx],
            None => &self.title,
        }
    }

    pub fn is_validated(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| v.is_validated())
    }
}

/// Normalise a DOI: strip resolver prefixes, trim, lowercase. Empty input yields `None`.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if doi.len() >= prefix.len() && doi[..prefix.len()].eq_ignore_ascii_case(prefix) {
            doi = &doi[prefix.len()..];
            break;
        }
    }
    let doi = doi.trim().to_lowercase();
    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

/// Trim a string and drop it when empty.
pub fn non_empty(value: impl AsRef<str>) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1000/ABC").as_deref(),
            Some("10.1000/abc")
        );
        assert_eq!(normalize_doi("  DOI:10.5/x ").as_deref(), Some("10.5/x"));
        assert_eq!(normalize_doi("10.1/x").as_deref(), Some("10.1/x"));
        assert_eq!(normalize_doi("   "), None);
    }

    #[test]
    fn test_work_type_labels() {
        assert_eq!(WorkType::from_label("journal-article"), WorkType::Article);
        assert_eq!(WorkType::from_label("Peer-Review"), WorkType::PeerReview);
        assert_eq!(WorkType::from_label("researchgate_record"), WorkType::Unknown);
        assert_eq!(WorkType::BookChapter.to_string(), "book-chapter");
    }

    #[test]
    fn test_work_type_serde_fallback() {
        let parsed: WorkType = serde_json::from_str("\"journal-article\"").unwrap();
        assert_eq!(parsed, WorkType::Article);
        let parsed: WorkType = serde_json::from_str("\"paratext\"").unwrap();
        assert_eq!(parsed, WorkType::Unknown);
    }

    #[test]
    fn test_feed_priority_order() {
        assert!(Feed::OpenAlex.priority() < Feed::Lattes.priority());
        assert!(Feed::ScholarBibtex.priority() < Feed::ScholarHtml.priority());
        assert!(Feed::ResearchGateCsv.priority() < Feed::ResearchGateHtml.priority());
        assert_eq!(Feed::ScholarHtml.source(), Source::Scholar);
    }

    #[test]
    fn test_volume_issue() {
        let biblio = Biblio {
            volume: Some("12".into()),
            issue: Some("3".into()),
            ..Default::default()
        };
        assert_eq!(biblio.volume_issue(), "volume=12, number=3");
        assert_eq!(Biblio::default().volume_issue(), "");
    }

    #[test]
    fn test_identity_prefers_doi() {
        let mut record = WorkRecord::new("Open Source AI", Source::Openalex);
        record.year = Some(2021);
        assert_eq!(record.identity(), "title:open source ai|2021");
        record.doi = Some("10.1/x".into());
        assert_eq!(record.identity(), "doi:10.1/x");
    }

    #[test]
    fn test_record_json_defaults() {
        let record: WorkRecord = serde_json::from_str(r#"{"title": "T", "unused": 1}"#).unwrap();
        assert_eq!(record.work_type, WorkType::Unknown);
        assert_eq!(record.citations, 0);
        assert!(record.validation.is_none());
    }
}
