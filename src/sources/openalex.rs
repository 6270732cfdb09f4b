//! OpenAlex author works.
//!
//! The author is resolved by ORCID (`/authors/orcid:{id}`), then
//! `works_api_url` is paged with `per-page=200` until `next_page`/`meta`
//! report the end. The raw works are kept as [`OpenAlexWork`] and normalised
//! into [`WorkRecord`]s by [`OpenAlexWork::into_record`].

use super::http::ApiClient;
use crate::error::{OptionExt, Result};
use crate::record::{non_empty, normalize_doi, AuthorRef, Biblio, Source, WorkRecord, WorkType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// OpenAlex API base URL
const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

/// Author summary returned by the ORCID lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAlexAuthorProfile {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub works_count: u64,
    pub works_api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    meta: PageMeta,
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    next_page: Option<serde_json::Value>,
}

/// One work as OpenAlex serves it (fields we use only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexWork {
    pub id: Option<String>,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub cited_by_count: Option<u64>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
    pub primary_location: Option<OpenAlexLocation>,
    pub best_oa_location: Option<OpenAlexLocation>,
    pub open_access: Option<OpenAlexOpenAccess>,
    #[serde(default)]
    pub keywords: Vec<OpenAlexKeyword>,
    pub biblio: Option<OpenAlexBiblio>,
    #[serde(rename = "abstract_inverted_index")]
    pub abstract_index: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexAuthorship {
    pub author: Option<OpenAlexAuthor>,
    #[serde(default)]
    pub institutions: Vec<OpenAlexInstitution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexAuthor {
    pub display_name: Option<String>,
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexInstitution {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexLocation {
    pub source: Option<OpenAlexSource>,
    pub landing_page_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexSource {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexOpenAccess {
    pub is_oa: Option<bool>,
    pub oa_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexKeyword {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexBiblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
}

impl OpenAlexWork {
    pub fn into_record(self) -> WorkRecord {
        let title = self
            .display_name
            .or(self.title)
            .and_then(non_empty)
            .unwrap_or_default();
        let mut record = WorkRecord::new(title, Source::Openalex);

        record.year = self.publication_year;
        record.work_type = self
            .work_type
            .as_deref()
            .map(WorkType::from_label)
            .unwrap_or_default();
        record.doi = self.doi.as_deref().and_then(normalize_doi);
        record.citations = self.cited_by_count.unwrap_or(0);

        record.authors = self
            .authorships
            .into_iter()
            .filter_map(|a| {
                let author = a.author?;
                Some(AuthorRef {
                    display_name: author.display_name.unwrap_or_default(),
                    orcid: author.orcid.and_then(non_empty),
                    institutions: a
                        .institutions
                        .into_iter()
                        .filter_map(|i| i.display_name.and_then(non_empty))
                        .collect(),
                })
            })
            .collect();

        if let Some(location) = &self.primary_location {
            record.venue = location
                .source
                .as_ref()
                .and_then(|s| s.display_name.clone())
                .and_then(non_empty);
            record.url = location.landing_page_url.clone().and_then(non_empty);
        }
        if record.url.is_none() {
            record.url = self
                .best_oa_location
                .as_ref()
                .and_then(|l| l.landing_page_url.clone())
                .and_then(non_empty);
        }

        if let Some(oa) = &self.open_access {
            record.open_access = oa.is_oa.unwrap_or(false);
            if record.url.is_none() {
                record.url = oa.oa_url.clone().and_then(non_empty);
            }
        }

        record.keywords = self
            .keywords
            .into_iter()
            .filter_map(|k| k.display_name.and_then(non_empty))
            .collect();

        if let Some(b) = self.biblio {
            record.biblio = Biblio {
                volume: b.volume.and_then(non_empty),
                issue: b.issue.and_then(non_empty),
                first_page: b.first_page.and_then(non_empty),
                last_page: b.last_page.and_then(non_empty),
            };
        }

        record.abstract_text = self
            .abstract_index
            .as_ref()
            .map(reconstruct_abstract)
            .and_then(non_empty);

        record
    }
}

/// Fetches every work attributed to one ORCID.
pub struct OpenAlexClient<'a> {
    http: &'a ApiClient,
    mailto: String,
}

impl<'a> OpenAlexClient<'a> {
    pub fn new(http: &'a ApiClient, mailto: impl Into<String>) -> Self {
        Self {
            http,
            mailto: mailto.into(),
        }
    }

    fn polite(&self) -> Vec<(&'static str, String)> {
        if self.mailto.is_empty() {
            Vec::new()
        } else {
            vec![("mailto", self.mailto.clone())]
        }
    }

    pub async fn fetch_author(&self, orcid: &str) -> Result<OpenAlexAuthorProfile> {
        let url = author_url(orcid);
        let author: OpenAlexAuthorProfile = self
            .http
            .get_json(&url, &self.polite())
            .await?
            .ok_or_parse(&format!("No OpenAlex author for ORCID {}", orcid))?;
        info!(
            name = author.display_name.as_deref().unwrap_or("Unknown"),
            id = author.id.as_deref().unwrap_or(""),
            works = author.works_count,
            "Resolved OpenAlex author"
        );
        Ok(author)
    }

    pub async fn fetch_works(&self, author: &OpenAlexAuthorProfile) -> Result<Vec<OpenAlexWork>> {
        let works_url = author
            .works_api_url
            .as_deref()
            .ok_or_parse("OpenAlex author has no works_api_url")?;

        let mut all_works = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = self.polite();
            query.push(("per-page", MAX_PER_PAGE.to_string()));
            query.push(("page", page.to_string()));

            let body: WorksPage = self
                .http
                .get_json(works_url, &query)
                .await?
                .ok_or_parse("OpenAlex works page not found")?;
            let fetched = body.results.len();
            all_works.extend(body.results);
            debug!(page = page, count = fetched, total = all_works.len(), "Fetched OpenAlex page");

            let exhausted = (all_works.len() as u64) >= body.meta.count;
            if fetched == 0 || (body.meta.next_page.is_none() && exhausted) {
                break;
            }
            page += 1;
        }

        info!(total = all_works.len(), "OpenAlex works fetched");
        Ok(all_works)
    }

    /// Author lookup plus all works, normalised.
    pub async fn fetch_records(&self, orcid: &str) -> Result<Vec<WorkRecord>> {
        let author = self.fetch_author(orcid).await?;
        let works = self.fetch_works(&author).await?;
        Ok(works.into_iter().map(OpenAlexWork::into_record).collect())
    }
}

fn author_url(orcid: &str) -> String {
    format!("{}/authors/orcid:{}", OPENALEX_API_BASE, orcid)
}

/// Rebuild plaintext from OpenAlex's inverted abstract index.
fn reconstruct_abstract(inverted_index: &serde_json::Value) -> String {
    let Some(obj) = inverted_index.as_object() else {
        return String::new();
    };
    let mut words: Vec<(i64, &str)> = obj
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_i64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();
    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}
