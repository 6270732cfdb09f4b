//! ResearchGate exports: the CSV publication export and a saved profile page.

use crate::error::{CvError, Result};
use crate::record::{non_empty, normalize_doi, Source, WorkRecord};
use crate::similarity::{collapse_whitespace, normalize_text};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

const RESEARCHGATE_BASE_URL: &str = "https://www.researchgate.net";

/// Titles shorter than this are navigation links, not publications.
const MIN_TITLE_LEN: usize = 10;

static PUBLICATION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/publication/\d+").expect("valid regex"));
static BADGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(New Article|Full-text available|Article|Chapter|Conference Paper)\s*")
        .expect("valid regex")
});
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));
static TRACKING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]_sg.*$").expect("valid regex"));

/// One row of the CSV export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchGateCsvRow {
    pub title: String,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl ResearchGateCsvRow {
    pub fn into_record(self) -> WorkRecord {
        let mut record = WorkRecord::new(self.title, Source::Researchgate);
        record.year = self.year;
        record.doi = self.doi.as_deref().and_then(normalize_doi);
        record.url = self.url;
        record
    }
}

/// Parse the CSV export. Column names are matched case-insensitively; rows
/// without a title are dropped.
pub fn parse_csv(data: &str) -> Result<Vec<ResearchGateCsvRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let title_col = column("title")
        .ok_or_else(|| CvError::Parse("ResearchGate CSV has no title column".to_string()))?;
    let (year_col, doi_col, url_col) = (column("year"), column("doi"), column("url"));

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(non_empty);

        let Some(title) = cell(Some(title_col)) else {
            continue;
        };
        rows.push(ResearchGateCsvRow {
            title,
            year: cell(year_col).and_then(|y| y.parse().ok()),
            doi: cell(doi_col),
            url: cell(url_col),
        });
    }

    info!(rows = rows.len(), "Parsed ResearchGate CSV export");
    Ok(rows)
}

/// One publication link found on the profile page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchGateLink {
    pub title: String,
    pub url: String,
    pub year: Option<i32>,
}

impl ResearchGateLink {
    pub fn into_record(self) -> WorkRecord {
        let mut record = WorkRecord::new(self.title, Source::Researchgate);
        record.url = Some(self.url);
        record.year = self.year;
        record
    }
}

/// Parse a saved profile page. Only links to a numeric publication id are
/// kept; badge words are stripped from the link text and repeated titles are
/// dropped.
pub fn parse_profile_html(html: &str) -> Result<Vec<ResearchGateLink>> {
    let document = Html::parse_document(html);
    let link_selector =
        Selector::parse(r#"a[href*="/publication/"]"#).map_err(|e| CvError::Parse(e.to_string()))?;
    let base = Url::parse(RESEARCHGATE_BASE_URL).map_err(|e| CvError::Parse(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !PUBLICATION_ID_RE.is_match(href) {
            continue;
        }

        let raw_text = link.text().collect::<String>();
        let title = collapse_whitespace(&BADGE_RE.replace_all(&raw_text, " "));
        if title.chars().count() < MIN_TITLE_LEN {
            continue;
        }
        if !seen.insert(normalize_text(&title)) {
            debug!(title = %title, "Skipping repeated ResearchGate link");
            continue;
        }

        let Ok(url) = base.join(href) else {
            continue;
        };
        let url = TRACKING_RE.replace(url.as_str(), "").into_owned();

        // The year sits in the surrounding list item, not the link itself.
        let year = link
            .parent()
            .and_then(scraper::ElementRef::wrap)
            .map(|parent| parent.text().collect::<String>())
            .and_then(|text| YEAR_RE.find(&text).and_then(|m| m.as_str().parse().ok()));

        links.push(ResearchGateLink { title, url, year });
    }

    info!(links = links.len(), "Parsed ResearchGate profile page");
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let data = "Title,Year,DOI,URL,Type\n\
                    Open Source AI,2019,10.1/X,https://rg.net/p/1,Article\n\
                    ,2020,,,\n\
                    Attractiveness of Projects,n/a,,,Conference Paper\n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, Some(2019));
        assert_eq!(rows[0].doi.as_deref(), Some("10.1/X"));
        assert_eq!(rows[1].year, None);
        assert_eq!(rows[1].url, None);

        let record = rows[0].clone().into_record();
        assert_eq!(record.doi.as_deref(), Some("10.1/x"));
        assert_eq!(record.source, Source::Researchgate);
    }

    #[test]
    fn test_parse_csv_requires_title() {
        assert!(parse_csv("name,year\nx,2020\n").is_err());
    }

    #[test]
    fn test_parse_profile_html() {
        let html = r#"<html><body><ul>
          <li><a href="/publication/123_Open_Source_AI?_sg=abc">Article Open Source AI in Government</a> Jan 2019</li>
          <li><a href="/publication/123_Open_Source_AI">Open Source AI in Government</a></li>
          <li><a href="/publication/456_x">Chapter</a></li>
          <li><a href="/publication/draft">Not a numeric publication link</a></li>
          <li><a href="https://www.researchgate.net/publication/789_Y">Full-text available Attractiveness of Projects</a> 2011</li>
        </ul></body></html>"#;
        let links = parse_profile_html(html).unwrap();
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].title, "Open Source AI in Government");
        assert_eq!(
            links[0].url,
            "https://www.researchgate.net/publication/123_Open_Source_AI"
        );
        assert_eq!(links[0].year, Some(2019));

        assert_eq!(links[1].title, "Attractiveness of Projects");
        assert_eq!(links[1].year, Some(2011));
    }
}
