//! Crossref enrichment by DOI.
//!
//! Looks up `GET /works/{doi}` for each DOI and keeps the abstract (HTML
//! stripped) and funder names. A 404 means "nothing to add"; any other
//! failure aborts the fetch.

use super::http::ApiClient;
use crate::error::Result;
use crate::record::{non_empty, normalize_doi, Source, WorkRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

/// Crossref API base URL
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefItem,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    funder: Vec<CrossrefFunder>,
}

#[derive(Debug, Deserialize)]
struct CrossrefFunder {
    #[serde(default)]
    name: String,
}

pub struct CrossrefClient<'a> {
    http: &'a ApiClient,
    mailto: String,
}

impl<'a> CrossrefClient<'a> {
    pub fn new(http: &'a ApiClient, mailto: impl Into<String>) -> Self {
        Self {
            http,
            mailto: mailto.into(),
        }
    }

    /// Enrichment record for one DOI, `None` when Crossref does not know it.
    pub async fn lookup_doi(&self, doi: &str) -> Result<Option<WorkRecord>> {
        let url = format!("{}/{}", CROSSREF_API_URL, urlencoding::encode(doi));
        let query: Vec<(&str, String)> = if self.mailto.is_empty() {
            Vec::new()
        } else {
            vec![("mailto", self.mailto.clone())]
        };
        let response: Option<CrossrefResponse> = self.http.get_json(&url, &query).await?;
        Ok(response.map(|r| parse_crossref_item(r.message, doi)))
    }

    /// Look up every distinct DOI in `records`, sequentially.
    pub async fn enrich_dois(&self, records: &[WorkRecord]) -> Result<Vec<WorkRecord>> {
        let mut dois: Vec<&str> = records.iter().filter_map(|r| r.doi.as_deref()).collect();
        dois.sort_unstable();
        dois.dedup();
        info!(count = dois.len(), "Starting Crossref lookups");

        let mut found = Vec::new();
        for doi in dois {
            match self.lookup_doi(doi).await? {
                Some(record) => found.push(record),
                None => debug!(doi = doi, "Not in Crossref"),
            }
        }
        info!(matched = found.len(), "Crossref lookups complete");
        Ok(found)
    }
}

fn parse_crossref_item(item: CrossrefItem, requested_doi: &str) -> WorkRecord {
    let title = item.title.into_iter().next().unwrap_or_default();
    let mut record = WorkRecord::new(title.trim(), Source::Crossref);
    record.doi = normalize_doi(&item.doi).or_else(|| normalize_doi(requested_doi));
    record.abstract_text = item
        .abstract_text
        .map(|s| strip_html_tags(&s))
        .and_then(non_empty);
    record.funders = item
        .funder
        .into_iter()
        .filter_map(|f| non_empty(f.name))
        .collect();
    record
}

/// Strip HTML/JATS tags and collapse the remaining whitespace.
fn strip_html_tags(text: &str) -> String {
    crate::similarity::collapse_whitespace(&HTML_TAG_RE.replace_all(text, " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(strip_html_tags("<jats:p>Hello</jats:p>"), "Hello");
        assert_eq!(strip_html_tags("No tags"), "No tags");
        assert_eq!(
            strip_html_tags("<b>Bold</b> and <i>italic</i>"),
            "Bold and italic"
        );
    }

    #[test]
    fn test_parse_crossref_item() {
        let json = r#"{"message": {
            "DOI": "10.1234/TEST",
            "title": ["Test Title"],
            "abstract": "<jats:p>This is abstract</jats:p>",
            "funder": [{"name": "CNPq"}, {"name": " "}],
            "container-title": ["Nature"]
        }}"#;
        let response: CrossrefResponse = serde_json::from_str(json).unwrap();
        let record = parse_crossref_item(response.message, "10.1234/test");

        assert_eq!(record.doi.as_deref(), Some("10.1234/test"));
        assert_eq!(record.title, "Test Title");
        assert_eq!(record.abstract_text.as_deref(), Some("This is abstract"));
        assert_eq!(record.funders, vec!["CNPq"]);
        assert_eq!(record.source, Source::Crossref);
    }

    #[test]
    fn test_parse_falls_back_to_requested_doi() {
        let record = parse_crossref_item(CrossrefItem::default(), "10.9/abc");
        assert_eq!(record.doi.as_deref(), Some("10.9/abc"));
        assert!(record.funders.is_empty());
    }
}
