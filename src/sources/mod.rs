//! Source feeds.
//!
//! Each feed parses into its own struct, wrapped in [`RawRecord`] and
//! normalised into a [`WorkRecord`] exactly once. Nothing downstream looks at
//! which fields are present to guess where a record came from.
//!
//! Remote feeds (OpenAlex, Crossref, ORCID) are async and share one
//! [`http::ApiClient`]. Local feeds read operator-saved files; a missing file
//! is an empty contribution, never an error.

pub mod crossref;
pub mod http;
pub mod lattes;
pub mod openalex;
pub mod orcid;
pub mod researchgate;
pub mod scholar;

use crate::config::Paths;
use crate::error::Result;
use crate::record::{Feed, WorkRecord};
use std::path::Path;
use tracing::{info, warn};

/// A record in its source-specific shape.
#[derive(Debug, Clone)]
pub enum RawRecord {
    OpenAlex(openalex::OpenAlexWork),
    Lattes(lattes::LattesWork),
    ScholarBibtex(scholar::ScholarBibEntry),
    ScholarHtml(scholar::ScholarRow),
    ResearchGateCsv(researchgate::ResearchGateCsvRow),
    ResearchGateHtml(researchgate::ResearchGateLink),
}

impl RawRecord {
    pub fn feed(&self) -> Feed {
        match self {
            RawRecord::OpenAlex(_) => Feed::OpenAlex,
            RawRecord::Lattes(_) => Feed::Lattes,
            RawRecord::ScholarBibtex(_) => Feed::ScholarBibtex,
            RawRecord::ScholarHtml(_) => Feed::ScholarHtml,
            RawRecord::ResearchGateCsv(_) => Feed::ResearchGateCsv,
            RawRecord::ResearchGateHtml(_) => Feed::ResearchGateHtml,
        }
    }

    pub fn into_record(self) -> WorkRecord {
        match self {
            RawRecord::OpenAlex(w) => w.into_record(),
            RawRecord::Lattes(w) => w.into_record(),
            RawRecord::ScholarBibtex(e) => e.into_record(),
            RawRecord::ScholarHtml(r) => r.into_record(),
            RawRecord::ResearchGateCsv(r) => r.into_record(),
            RawRecord::ResearchGateHtml(l) => l.into_record(),
        }
    }
}

/// Normalised records from one feed.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub feed: Feed,
    pub records: Vec<WorkRecord>,
}

impl SourceBatch {
    /// Normalise raw records belonging to `feed`. Records from other feeds
    /// are a programming error and are dropped with a warning.
    pub fn from_raw(feed: Feed, raw: Vec<RawRecord>) -> Self {
        let records = raw
            .into_iter()
            .filter(|r| {
                let matches = r.feed() == feed;
                if !matches {
                    warn!(expected = %feed, actual = %r.feed(), "Dropping record from wrong feed");
                }
                matches
            })
            .map(RawRecord::into_record)
            .filter(|r| !r.title.trim().is_empty())
            .collect();
        Self { feed, records }
    }
}

/// Read the saved file for a local feed. `Ok(None)` when the file is absent.
pub fn read_local(feed: Feed, paths: &Paths) -> Result<Option<Vec<RawRecord>>> {
    let path = match feed {
        Feed::Lattes => &paths.lattes_xml,
        Feed::ScholarBibtex => &paths.scholar_bibtex,
        Feed::ScholarHtml => &paths.scholar_html,
        Feed::ResearchGateCsv => &paths.researchgate_csv,
        Feed::ResearchGateHtml => &paths.researchgate_html,
        Feed::OpenAlex | Feed::Crossref | Feed::Orcid => return Ok(None),
    };
    if !path.exists() {
        warn!(feed = %feed, path = %path.display(), "Source file not found, contributing nothing");
        return Ok(None);
    }

    let raw = match feed {
        Feed::Lattes => lattes::read_lattes(path)?
            .into_iter()
            .map(RawRecord::Lattes)
            .collect(),
        Feed::ScholarBibtex => scholar::parse_bibtex_export(&read_text(path)?)
            .into_iter()
            .map(RawRecord::ScholarBibtex)
            .collect(),
        Feed::ScholarHtml => scholar::parse_profile_html(&read_text(path)?)?
            .into_iter()
            .map(RawRecord::ScholarHtml)
            .collect(),
        Feed::ResearchGateCsv => researchgate::parse_csv(&read_text(path)?)?
            .into_iter()
            .map(RawRecord::ResearchGateCsv)
            .collect(),
        Feed::ResearchGateHtml => researchgate::parse_profile_html(&read_text(path)?)?
            .into_iter()
            .map(RawRecord::ResearchGateHtml)
            .collect(),
        Feed::OpenAlex | Feed::Crossref | Feed::Orcid => Vec::new(),
    };
    Ok(Some(raw))
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Ingest every local feed. `None` marks a feed whose file is absent.
///
/// Any parse failure aborts before a batch is returned, so callers never
/// see a partial ingest.
pub fn ingest_local(paths: &Paths) -> Result<Vec<(Feed, Option<SourceBatch>)>> {
    let local = [
        Feed::Lattes,
        Feed::ScholarBibtex,
        Feed::ScholarHtml,
        Feed::ResearchGateCsv,
        Feed::ResearchGateHtml,
    ];
    let mut batches = Vec::with_capacity(local.len());
    for feed in local {
        let batch = read_local(feed, paths)?.map(|raw| SourceBatch::from_raw(feed, raw));
        if let Some(batch) = &batch {
            info!(feed = %feed, records = batch.records.len(), "Ingested local feed");
        }
        batches.push((feed, batch));
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_in(dir: &TempDir) -> Paths {
        Paths {
            data_dir: dir.path().join("processed"),
            lattes_xml: dir.path().join("lattes.xml"),
            scholar_html: dir.path().join("scholar.html"),
            scholar_bibtex: dir.path().join("scholar.bib"),
            researchgate_csv: dir.path().join("rg.csv"),
            researchgate_html: dir.path().join("rg.html"),
            manual_additions: dir.path().join("manual.json"),
            output_bib: dir.path().join("out.bib"),
        }
    }

    #[test]
    fn test_ingest_missing_files_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let batches = ingest_local(&paths_in(&dir))?;
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|(_, b)| b.is_none()));
        Ok(())
    }

    #[test]
    fn test_ingest_reads_present_files() -> Result<()> {
        let dir = TempDir::new()?;
        let paths = paths_in(&dir);
        std::fs::write(&paths.researchgate_csv, "title,year\nOpen Source AI,2019\n")?;

        let batches = ingest_local(&paths)?;
        let rg = batches
            .iter()
            .find(|(feed, _)| *feed == Feed::ResearchGateCsv)
            .and_then(|(_, b)| b.as_ref())
            .unwrap();
        assert_eq!(rg.feed, Feed::ResearchGateCsv);
        assert_eq!(rg.records.len(), 1);
        assert_eq!(rg.records[0].year, Some(2019));
        Ok(())
    }

    #[test]
    fn test_from_raw_drops_other_feeds() {
        let raw = vec![
            RawRecord::ScholarHtml(scholar::ScholarRow {
                title: "Kept".into(),
                ..Default::default()
            }),
            RawRecord::ResearchGateHtml(researchgate::ResearchGateLink {
                title: "Dropped".into(),
                url: "https://www.researchgate.net/publication/1".into(),
                year: None,
            }),
        ];
        let batch = SourceBatch::from_raw(Feed::ScholarHtml, raw);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].title, "Kept");
    }
}
