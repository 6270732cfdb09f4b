//! ORCID public API works list.
//!
//! ORCID does not contribute records to the merge. Its grouped works list is
//! kept as a seed: the number of groups is compared with what OpenAlex found,
//! and the DOIs it lists help spot works missing from OpenAlex.

use super::http::ApiClient;
use crate::error::{OptionExt, Result};
use crate::record::normalize_doi;
use serde::{Deserialize, Serialize};
use tracing::info;

const ORCID_API_BASE: &str = "https://pub.orcid.org/v3.0";

/// What ORCID knows about the author's works.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrcidSeed {
    pub orcid: String,
    /// Number of work groups (ORCID merges duplicate claims into one group)
    pub work_count: usize,
    pub dois: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    group: Vec<WorkGroup>,
}

#[derive(Debug, Deserialize)]
struct WorkGroup {
    #[serde(rename = "external-ids", default)]
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "external-id", default)]
    external_id: Vec<ExternalId>,
}

#[derive(Debug, Deserialize)]
struct ExternalId {
    #[serde(rename = "external-id-type", default)]
    id_type: String,
    #[serde(rename = "external-id-value", default)]
    value: String,
}

pub async fn fetch_seed(http: &ApiClient, orcid: &str) -> Result<OrcidSeed> {
    let url = format!("{}/{}/works", ORCID_API_BASE, orcid);
    let response: WorksResponse = http
        .get_json(&url, &[])
        .await?
        .ok_or_parse(&format!("ORCID record {} not found", orcid))?;
    let seed = seed_from_response(orcid, response);
    info!(orcid = orcid, works = seed.work_count, dois = seed.dois.len(), "Fetched ORCID works");
    Ok(seed)
}

fn seed_from_response(orcid: &str, response: WorksResponse) -> OrcidSeed {
    let work_count = response.group.len();
    let mut dois: Vec<String> = response
        .group
        .into_iter()
        .filter_map(|g| g.external_ids)
        .flat_map(|ids| ids.external_id)
        .filter(|id| id.id_type.eq_ignore_ascii_case("doi"))
        .filter_map(|id| normalize_doi(&id.value))
        .collect();
    dois.sort();
    dois.dedup();
    OrcidSeed {
        orcid: orcid.to_string(),
        work_count,
        dois,
    }
}
