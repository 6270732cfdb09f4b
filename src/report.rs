//! Statistics over the validated set.

use crate::record::WorkRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Citation distribution buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationBuckets {
    pub over_50: usize,
    pub from_11_to_50: usize,
    pub from_1_to_10: usize,
    pub zero: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub with_doi: usize,
    pub open_access: usize,
    pub with_keywords: usize,
    pub multiple_authors: usize,
}

/// Short listing used for top-cited and most-recent tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub title: String,
    pub year: Option<i32>,
    pub citations: u64,
    pub venue: Option<String>,
}

impl From<&WorkRecord> for WorkSummary {
    fn from(r: &WorkRecord) -> Self {
        Self {
            title: r.title.clone(),
            year: r.year,
            citations: r.citations,
            venue: r.venue.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub excluded: usize,
    pub dropped_untitled: usize,
    pub manual_added: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_year: BTreeMap<i32, usize>,
    pub top_venues: Vec<(String, usize)>,
    /// Byline position -> count
    pub author_positions: BTreeMap<usize, usize>,
    pub total_citations: u64,
    pub average_citations: f64,
    pub citation_buckets: CitationBuckets,
    pub data_quality: DataQuality,
    pub top_cited: Vec<WorkSummary>,
    pub most_recent: Vec<WorkSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

const TOP_VENUES: usize = 10;
const TOP_WORKS: usize = 5;

impl ValidationReport {
    pub fn from_records(validated: &[WorkRecord]) -> Self {
        let mut report = ValidationReport {
            total: validated.len(),
            ..Default::default()
        };

        let mut venues: HashMap<&str, usize> = HashMap::new();
        for r in validated {
            *report.by_type.entry(r.work_type.to_string()).or_default() += 1;
            if let Some(year) = r.year {
                *report.by_year.entry(year).or_default() += 1;
            }
            if let Some(venue) = r.venue.as_deref() {
                *venues.entry(venue).or_default() += 1;
            }
            if let Some(pos) = r.validation.as_ref().and_then(|v| v.author_position) {
                *report.author_positions.entry(pos).or_default() += 1;
            }

            report.total_citations += r.citations;
            let bucket = &mut report.citation_buckets;
            match r.citations {
                0 => bucket.zero += 1,
                1..=10 => bucket.from_1_to_10 += 1,
                11..=50 => bucket.from_11_to_50 += 1,
                _ => bucket.over_50 += 1,
            }

            let quality = &mut report.data_quality;
            quality.with_doi += usize::from(r.has_doi());
            quality.open_access += usize::from(r.open_access);
            quality.with_keywords += usize::from(!r.keywords.is_empty());
            quality.multiple_authors += usize::from(r.authors.len() > 1);
        }

        if !validated.is_empty() {
            report.average_citations = report.total_citations as f64 / validated.len() as f64;
        }

        let mut venues: Vec<(String, usize)> =
            venues.into_iter().map(|(v, n)| (v.to_string(), n)).collect();
        venues.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        venues.truncate(TOP_VENUES);
        report.top_venues = venues;

        let mut by_citations: Vec<&WorkRecord> = validated.iter().collect();
        by_citations.sort_by(|a, b| b.citations.cmp(&a.citations));
        report.top_cited = by_citations.iter().take(TOP_WORKS).map(|r| (*r).into()).collect();

        let mut by_year: Vec<&WorkRecord> = validated.iter().collect();
        by_year.sort_by(|a, b| b.year.cmp(&a.year));
        report.most_recent = by_year.iter().take(TOP_WORKS).map(|r| (*r).into()).collect();

        report
    }

    /// Plain-text summary for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Validated works: {}", self.total);
        let _ = writeln!(out, "Excluded works:  {}", self.excluded);
        if self.dropped_untitled > 0 {
            let _ = writeln!(out, "Dropped (no title): {}", self.dropped_untitled);
        }
        if self.manual_added > 0 {
            let _ = writeln!(out, "Manual additions: {}", self.manual_added);
        }

        let _ = writeln!(out, "\nBy type:");
        for (t, n) in &self.by_type {
            let _ = writeln!(out, "  {:<22} {}", t, n);
        }

        let _ = writeln!(
            out,
            "\nCitations: {} total, {:.1} average",
            self.total_citations, self.average_citations
        );
        let b = &self.citation_buckets;
        let _ = writeln!(
            out,
            "  >50: {}  11-50: {}  1-10: {}  0: {}",
            b.over_50, b.from_11_to_50, b.from_1_to_10, b.zero
        );

        let q = &self.data_quality;
        let _ = writeln!(
            out,
            "\nData quality: {} with DOI, {} open access, {} with keywords, {} multi-author",
            q.with_doi, q.open_access, q.with_keywords, q.multiple_authors
        );

        if !self.top_cited.is_empty() {
            let _ = writeln!(out, "\nTop cited:");
            for w in &self.top_cited {
                let _ = writeln!(out, "  [{}] {}", w.citations, w.title);
            }
        }
        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings: {}", self.warnings.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuthorRef, Source, ValidationStatus, WorkType};

    fn rec(title: &str, year: i32, citations: u64, venue: &str) -> WorkRecord {
        let mut r = WorkRecord::new(title, Source::Openalex);
        r.year = Some(year);
        r.citations = citations;
        r.venue = Some(venue.to_string());
        r.work_type = WorkType::Article;
        r.validation = Some(ValidationStatus {
            orcid_verified: true,
            content_verified: true,
            author_position: Some(1),
            ..Default::default()
        });
        r
    }

    #[test]
    fn test_report_counts() {
        let mut multi = rec("C", 2018, 0, "ISJ");
        multi.authors = vec![AuthorRef::named("A"), AuthorRef::named("B")];
        multi.doi = Some("10.1/c".to_string());
        let records = vec![rec("A", 2020, 60, "ISJ"), rec("B", 2021, 5, "MISQ"), multi];

        let report = ValidationReport::from_records(&records);
        assert_eq!(report.total, 3);
        assert_eq!(report.by_type.get("article"), Some(&3));
        assert_eq!(report.top_venues[0], ("ISJ".to_string(), 2));
        assert_eq!(report.author_positions.get(&1), Some(&3));
        assert_eq!(report.total_citations, 65);
        assert_eq!(report.citation_buckets.over_50, 1);
        assert_eq!(report.citation_buckets.from_1_to_10, 1);
        assert_eq!(report.citation_buckets.zero, 1);
        assert_eq!(report.data_quality.with_doi, 1);
        assert_eq!(report.data_quality.multiple_authors, 1);
        assert_eq!(report.top_cited[0].title, "A");
        assert_eq!(report.most_recent[0].title, "B");
    }

    #[test]
    fn test_empty_report() {
        let report = ValidationReport::from_records(&[]);
        assert_eq!(report.average_citations, 0.0);
        assert!(report.render_text().contains("Validated works: 0"));
    }
}
