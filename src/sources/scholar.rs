//! Google Scholar profile exports: the saved profile page and the BibTeX
//! export.

use crate::bibtex::reader::{parse_bibliography, ParsedEntry};
use crate::error::{CvError, Result};
use crate::record::{non_empty, normalize_doi, AuthorRef, Biblio, Source, WorkRecord, WorkType};
use crate::similarity::collapse_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

const SCHOLAR_BASE_URL: &str = "https://scholar.google.com";

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})").expect("valid regex"));

/// One row of the profile's publication table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScholarRow {
    pub title: String,
    pub url: Option<String>,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub citations: u64,
}

impl ScholarRow {
    pub fn into_record(self) -> WorkRecord {
        let mut record = WorkRecord::new(self.title, Source::Scholar);
        record.url = self.url;
        record.authors = self.authors.into_iter().map(AuthorRef::named).collect();
        record.venue = self.venue;
        record.year = self.year;
        record.citations = self.citations;
        record
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CvError::Parse(e.to_string()))
}

fn element_text(element: ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Parse a saved Scholar profile page.
pub fn parse_profile_html(html: &str) -> Result<Vec<ScholarRow>> {
    let document = Html::parse_document(html);

    let row_selector = selector("tr.gsc_a_tr")?;
    let title_selector = selector("a.gsc_a_at")?;
    let gray_selector = selector("div.gs_gray")?;
    let cites_selector = selector("a.gsc_a_ac")?;
    let year_selector = selector("span.gsc_a_h")?;

    let base = Url::parse(SCHOLAR_BASE_URL).map_err(|e| CvError::Parse(e.to_string()))?;
    let mut rows = Vec::new();

    for row in document.select(&row_selector) {
        let Some(link) = row.select(&title_selector).next() else {
            continue;
        };
        let title = element_text(link);
        if title.is_empty() {
            continue;
        }

        let mut data = ScholarRow {
            title,
            url: link
                .value()
                .attr("href")
                .and_then(|href| base.join(href).ok())
                .map(|u| u.to_string()),
            ..Default::default()
        };

        let gray: Vec<String> = row.select(&gray_selector).map(element_text).collect();
        if let Some(authors) = gray.first() {
            data.authors = authors
                .split(", ")
                .filter_map(non_empty)
                .filter(|a| a != "...")
                .collect();
        }
        if let Some(venue_line) = gray.get(1) {
            match YEAR_RE.captures_iter(venue_line).last().and_then(|c| c.get(1)) {
                Some(m) => {
                    data.year = m.as_str().parse().ok();
                    data.venue = non_empty(venue_line[..m.start()].trim().trim_end_matches(','));
                }
                None => data.venue = non_empty(venue_line),
            }
        }

        data.citations = row
            .select(&cites_selector)
            .next()
            .map(element_text)
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);

        if data.year.is_none() {
            data.year = row
                .select(&year_selector)
                .next()
                .map(element_text)
                .and_then(|t| t.parse().ok());
        }

        rows.push(data);
    }

    info!(rows = rows.len(), "Parsed Scholar profile page");
    Ok(rows)
}

/// One entry of the Scholar BibTeX export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarBibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<(String, String)>,
}

impl From<ParsedEntry> for ScholarBibEntry {
    fn from(entry: ParsedEntry) -> Self {
        Self {
            entry_type: entry.entry_type,
            key: entry.key,
            fields: entry.fields,
        }
    }
}

impl ScholarBibEntry {
    fn field(&self, name: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| non_empty(strip_braces(v)))
    }

    pub fn into_record(self) -> WorkRecord {
        let title = self.field("title").unwrap_or_default();
        let mut record = WorkRecord::new(title, Source::Scholar);
        record.work_type = match self.entry_type.as_str() {
            "article" => WorkType::Article,
            "inproceedings" | "conference" => WorkType::ProceedingsArticle,
            "incollection" | "inbook" => WorkType::BookChapter,
            "book" => WorkType::Book,
            "unpublished" => WorkType::Preprint,
            _ => WorkType::Unknown,
        };
        record.year = self.field("year").and_then(|y| y.parse().ok());
        record.venue = self
            .field("journal")
            .or_else(|| self.field("booktitle"))
            .or_else(|| self.field("publisher"));
        record.doi = self.field("doi").as_deref().and_then(normalize_doi);
        record.url = self.field("url");
        record.authors = self
            .field("author")
            .map(|authors| {
                authors
                    .split(" and ")
                    .filter_map(non_empty)
                    .map(|name| AuthorRef::named(invert_name(&name)))
                    .collect()
            })
            .unwrap_or_default();

        let (first_page, last_page) = match self.field("pages") {
            Some(pages) => split_pages(&pages),
            None => (None, None),
        };
        record.biblio = Biblio {
            volume: self.field("volume"),
            issue: self.field("number"),
            first_page,
            last_page,
        };
        record
    }
}

/// Parse the Scholar BibTeX export. Malformed entries are skipped with a warning.
pub fn parse_bibtex_export(input: &str) -> Vec<ScholarBibEntry> {
    let parsed = parse_bibliography(input);
    if parsed.skipped > 0 {
        warn!(skipped = parsed.skipped, "Skipped malformed Scholar BibTeX entries");
    }
    info!(entries = parsed.entries.len(), "Parsed Scholar BibTeX export");
    parsed.entries.into_iter().map(ScholarBibEntry::from).collect()
}

fn strip_braces(value: &str) -> String {
    collapse_whitespace(&value.replace(['{', '}'], ""))
}

/// `Santos, Carlos Denner dos` -> `Carlos Denner dos Santos`.
fn invert_name(name: &str) -> String {
    match name.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => name.trim().trim_end_matches(',').to_string(),
    }
}

fn split_pages(pages: &str) -> (Option<String>, Option<String>) {
    let mut parts = pages.split('-').filter_map(non_empty);
    (parts.next(), parts.next())
}
