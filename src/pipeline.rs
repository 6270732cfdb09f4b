//! Stage orchestration.
//!
//! [`PipelineContext`] carries the configuration and the snapshot store
//! through every stage. Each stage loads its whole input snapshot, computes
//! its output in memory and only then writes, so a failed stage leaves the
//! previous snapshots untouched.

use crate::audit::{AuditMatch, BibAudit};
use crate::bibtex::{self, BibRenderer, KeyAllocator};
use crate::classify::{self, ConferenceDetector, ReclassificationLog};
use crate::config::{PipelineConfig, TypeOverride};
use crate::dedup::{self, DedupOutcome};
use crate::error::Result;
use crate::merge::{self, MergeReport, Merger};
use crate::record::{Feed, WorkRecord};
use crate::report::ValidationReport;
use crate::snapshot::{self, SnapshotStore};
use crate::sources::crossref::CrossrefClient;
use crate::sources::http::ApiClient;
use crate::sources::openalex::OpenAlexClient;
use crate::sources::orcid::{self, OrcidSeed};
use crate::sources::{self, SourceBatch};
use crate::validate::{self, ExcludedWork, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Counts from the remote fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub openalex: usize,
    pub crossref: usize,
    pub orcid_works: usize,
}

/// Counts from the classification stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifySummary {
    pub records: usize,
    /// Earlier logged changes re-applied to the re-derived set
    pub replayed: usize,
    pub overrides_applied: usize,
}

/// Counts from BibTeX generation.
#[derive(Debug, Clone, Default)]
pub struct BibSummary {
    pub path: PathBuf,
    pub written: usize,
    pub skipped: usize,
    pub failed: Vec<(usize, String)>,
    /// Records already present in the existing file (append mode)
    pub already_present: usize,
}

pub struct PipelineContext {
    pub config: PipelineConfig,
    pub store: SnapshotStore,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Self {
        let store = SnapshotStore::new(config.paths.data_dir.clone());
        Self { config, store }
    }

    /// Fetch OpenAlex works, Crossref enrichment and the ORCID seed.
    /// Nothing is written unless all three succeed.
    pub async fn fetch(&self) -> Result<FetchSummary> {
        let orcid_id = self.config.bare_orcid();
        let http = ApiClient::new(&self.config.http, &self.config.mailto)?;

        let openalex = OpenAlexClient::new(&http, self.config.mailto.clone())
            .fetch_records(orcid_id)
            .await?;
        let crossref = CrossrefClient::new(&http, self.config.mailto.clone())
            .enrich_dois(&openalex)
            .await?;
        let seed = orcid::fetch_seed(&http, orcid_id).await?;

        self.store.save_feed(Feed::OpenAlex, &openalex)?;
        self.store.save_feed(Feed::Crossref, &crossref)?;
        self.store.save(snapshot::ORCID_SEED, &seed)?;

        Ok(FetchSummary {
            openalex: openalex.len(),
            crossref: crossref.len(),
            orcid_works: seed.work_count,
        })
    }

    /// Parse the local source files into per-feed snapshots. Absent files
    /// leave their snapshot untouched.
    pub fn ingest(&self) -> Result<Vec<(Feed, Option<usize>)>> {
        let batches = sources::ingest_local(&self.config.paths)?;
        let mut counts = Vec::with_capacity(batches.len());
        for (feed, batch) in batches {
            match batch {
                Some(batch) => {
                    self.store.save_feed(feed, &batch.records)?;
                    counts.push((feed, Some(batch.records.len())));
                }
                None => counts.push((feed, None)),
            }
        }
        Ok(counts)
    }

    /// Merge every feed snapshot into `merged.json`.
    pub fn merge(&self) -> Result<MergeReport> {
        let mut batches = Vec::new();
        let mut missing = Vec::new();
        for feed in Feed::MERGE_ORDER {
            match self.store.load_feed(feed)? {
                Some(records) => batches.push(SourceBatch { feed, records }),
                None => missing.push(feed),
            }
        }

        let (mut merged, mut report) = Merger::new(&self.config.thresholds).merge(batches);
        for feed in missing {
            report.mark_missing(feed);
        }

        if let Some(crossref) = self.store.load_feed(Feed::Crossref)? {
            report.crossref_enriched = merge::enrich_from_crossref(&mut merged, &crossref);
        }
        if self.store.path(snapshot::ORCID_SEED).exists() {
            let seed: OrcidSeed = self.store.load(snapshot::ORCID_SEED)?;
            merge::compare_with_orcid(&mut report, &seed, &merged);
        }

        self.store.save(snapshot::MERGED, &merged)?;
        self.store.save(snapshot::MERGE_REPORT, &report)?;
        Ok(report)
    }

    /// Validate `merged.json`, add manual approvals and write the report.
    pub fn validate(&self) -> Result<ValidationReport> {
        let merged: Vec<WorkRecord> = self.store.load(snapshot::MERGED)?;
        let mut outcome = Validator::new(&self.config).validate_all(merged);

        let manual_path = &self.config.paths.manual_additions;
        let manual_added = if manual_path.exists() {
            let additions: Vec<WorkRecord> = snapshot::read_json(manual_path)?;
            validate::add_manual(&mut outcome.validated, additions).added
        } else {
            0
        };

        let mut report = ValidationReport::from_records(&outcome.validated);
        report.excluded = outcome.excluded.len();
        report.dropped_untitled = outcome.dropped_untitled;
        report.manual_added = manual_added;
        report.warnings = outcome.warnings;

        self.store.save(snapshot::VALIDATED, &outcome.validated)?;
        self.store.save(snapshot::EXCLUDED, &outcome.excluded)?;
        self.store.save(snapshot::VALIDATION_REPORT, &report)?;
        Ok(report)
    }

    pub fn dedup(&self) -> Result<DedupOutcome> {
        let validated: Vec<WorkRecord> = self.store.load(snapshot::VALIDATED)?;
        let outcome = dedup::deduplicate(validated, &self.config.classification);
        self.store.save(snapshot::DEDUPLICATED, &outcome.records)?;
        self.store.save(snapshot::SUPERSEDED, &outcome.superseded)?;
        Ok(outcome)
    }

    /// Derive `classified.json` from the deduplicated set. Every change in the
    /// existing log is replayed first, then the configured overrides apply;
    /// the log is only ever appended to.
    pub fn classify(&self) -> Result<ClassifySummary> {
        let mut records: Vec<WorkRecord> = self.store.load(snapshot::DEDUPLICATED)?;
        let mut log: ReclassificationLog = self.store.load_or_default(snapshot::RECLASSIFICATIONS)?;
        let replayed = log.replay(&mut records);
        let applied = classify::apply_overrides(&mut records, &self.config.overrides, &mut log)?;

        self.save_classified(&records, &log)?;
        Ok(ClassifySummary {
            records: records.len(),
            replayed,
            overrides_applied: applied,
        })
    }

    fn load_classified(&self) -> Result<(Vec<WorkRecord>, ReclassificationLog)> {
        let records = self.store.load(snapshot::CLASSIFIED)?;
        let log = self.store.load_or_default(snapshot::RECLASSIFICATIONS)?;
        Ok((records, log))
    }

    fn save_classified(&self, records: &[WorkRecord], log: &ReclassificationLog) -> Result<()> {
        self.store.save(snapshot::CLASSIFIED, records)?;
        self.store.save(snapshot::RECLASSIFICATIONS, log)?;
        Ok(())
    }

    /// One-off manual reclassification of `classified.json`.
    pub fn reclassify(&self, ov: &TypeOverride) -> Result<usize> {
        let (mut records, mut log) = self.load_classified()?;
        let changed = classify::apply_override(&mut records, ov, &mut log)?;
        if changed > 0 {
            self.save_classified(&records, &log)?;
        }
        Ok(changed)
    }

    /// Conference-paper heuristic over `classified.json`.
    pub fn detect_conferences(&self, aggressive: bool) -> Result<usize> {
        let (mut records, mut log) = self.load_classified()?;
        let converted = ConferenceDetector::new(&self.config.classification).detect(
            &mut records,
            aggressive,
            &mut log,
        );
        if converted > 0 {
            self.save_classified(&records, &log)?;
        }
        Ok(converted)
    }

    /// Undo logged change `index`.
    pub fn revert(&self, index: usize) -> Result<usize> {
        let (mut records, mut log) = self.load_classified()?;
        let reverted = classify::revert(&mut records, index, &mut log)?;
        if reverted > 0 {
            self.save_classified(&records, &log)?;
        }
        Ok(reverted)
    }

    /// Render `classified.json` to the output `.bib`. With `append`, existing
    /// entries stay untouched and likely duplicates of them are skipped.
    pub fn bibtex(&self, append: bool) -> Result<BibSummary> {
        let records: Vec<WorkRecord> = self.store.load(snapshot::CLASSIFIED)?;
        let path = self.config.paths.output_bib.clone();
        let peer_review = self.config.classification.peer_review;

        if append && path.exists() {
            let existing = std::fs::read_to_string(&path)?;
            let parsed = bibtex::parse_bibliography(&existing);
            let audit = BibAudit::new(
                &self.config.thresholds,
                self.config.author.target_surname(),
            );
            let checked = audit.audit(records, &parsed.entries);
            let duplicates: Vec<(String, AuditMatch)> = checked
                .duplicates
                .iter()
                .map(|(r, m)| (r.title.clone(), m.clone()))
                .collect();

            let keys = KeyAllocator::with_reserved(bibtex::existing_keys(&existing));
            let mut renderer = BibRenderer::with_keys(&self.config.bibtex, peer_review, keys);
            let outcome = renderer.render_all(&checked.fresh);

            self.store.save(snapshot::BIB_DUPLICATES, &duplicates)?;
            let written = bibtex::append_entries(&path, &outcome.entries)?;
            return Ok(BibSummary {
                path,
                written,
                skipped: outcome.skipped,
                failed: outcome.failed,
                already_present: duplicates.len(),
            });
        }

        if append {
            warn!(path = %path.display(), "No existing bibliography, writing a new one");
        }
        let mut renderer = BibRenderer::new(&self.config.bibtex, peer_review);
        let outcome = renderer.render_all(&records);
        bibtex::write_bibliography(&path, &self.config.bibtex, &outcome.entries)?;
        Ok(BibSummary {
            path,
            written: outcome.entries.len(),
            skipped: outcome.skipped,
            failed: outcome.failed,
            already_present: 0,
        })
    }

    /// Excluded works from the last validation, for review.
    pub fn excluded(&self) -> Result<Vec<ExcludedWork>> {
        self.store.load(snapshot::EXCLUDED)
    }

    /// Every offline stage in order.
    pub fn run_offline(&self) -> Result<BibSummary> {
        let merge = self.merge()?;
        info!(merged = merge.merged_records, "Merge stage done");
        let validation = self.validate()?;
        info!(validated = validation.total, excluded = validation.excluded, "Validation stage done");
        let dedup = self.dedup()?;
        info!(removed = dedup.duplicates_removed(), "Dedup stage done");
        self.classify()?;
        self.bibtex(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuthorRef, Source, WorkType};
    use tempfile::TempDir;

    const ORCID: &str = "0000-0002-4481-0115";

    fn context(dir: &TempDir) -> PipelineContext {
        let mut config = PipelineConfig {
            orcid: ORCID.to_string(),
            ..Default::default()
        };
        config.paths.data_dir = dir.path().join("processed");
        config.paths.manual_additions = dir.path().join("manual.json");
        config.paths.output_bib = dir.path().join("latex").join("publications.bib");
        config.paths.lattes_xml = dir.path().join("absent.xml");
        config.paths.scholar_html = dir.path().join("absent.html");
        config.paths.scholar_bibtex = dir.path().join("absent.bib");
        config.paths.researchgate_csv = dir.path().join("absent.csv");
        config.paths.researchgate_html = dir.path().join("absent_rg.html");
        PipelineContext::new(config)
    }

    fn target_author() -> AuthorRef {
        AuthorRef {
            display_name: "Carlos Denner dos Santos".to_string(),
            orcid: Some(format!("https://orcid.org/{}", ORCID)),
            institutions: vec!["Universidade de Brasília".to_string()],
        }
    }

    fn work(title: &str, doi: Option<&str>, source: Source) -> WorkRecord {
        let mut r = WorkRecord::new(title, source);
        r.doi = doi.map(str::to_string);
        r.year = Some(2021);
        r.work_type = WorkType::Article;
        r.authors = vec![target_author()];
        r
    }

    #[test]
    fn test_doi_merge_scenario() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);

        let mut openalex = work("Open Source AI", Some("10.1/x"), Source::Openalex);
        openalex.citations = 5;
        let mut scholar = WorkRecord::new("", Source::Scholar);
        scholar.doi = Some("10.1/x".to_string());
        scholar.citations = 12;
        let unrelated = work("Crowdsourcing software", Some("10.1/y"), Source::Openalex);

        ctx.store.save_feed(Feed::OpenAlex, &[openalex, unrelated])?;
        ctx.store.save_feed(Feed::ScholarHtml, &[scholar])?;

        let report = ctx.merge()?;
        let merged: Vec<WorkRecord> = ctx.store.load(snapshot::MERGED)?;
        assert_eq!(merged.len(), 2);
        let joined = merged.iter().find(|r| r.doi.as_deref() == Some("10.1/x")).unwrap();
        assert_eq!(joined.citations, 12);
        assert_eq!(joined.title, "Open Source AI");
        assert!(report.feeds.iter().any(|s| s.feed == Feed::Lattes && s.missing));
        Ok(())
    }

    #[test]
    fn test_unlikely_area_scenario() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);
        let records = vec![
            work("Bacterial Disease in Eucalyptus", Some("10.1/e"), Source::Openalex),
            work("Open source governance", Some("10.1/g"), Source::Openalex),
        ];
        ctx.store.save(snapshot::MERGED, &records)?;

        let report = ctx.validate()?;
        assert_eq!(report.total, 1);
        assert_eq!(report.excluded, 1);

        let excluded = ctx.excluded()?;
        let status = excluded[0].record.validation.as_ref().unwrap();
        assert!(status.orcid_verified);
        assert!(!status.content_verified);
        // "bacteria" is listed before "eucalyptus", so it is the keyword reported.
        assert_eq!(excluded[0].reason, "unlikely research area: bacteria");
        Ok(())
    }

    #[test]
    fn test_preprint_reclassified_to_article() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);
        let mut preprint = work("Open source AI governance", Some("10.31235/osf.io/abc"), Source::Openalex);
        preprint.work_type = WorkType::Preprint;
        preprint.venue = Some("SocArXiv".to_string());
        ctx.store.save(snapshot::CLASSIFIED, &vec![preprint])?;

        let ov = TypeOverride {
            doi: Some("10.31235/osf.io/abc".to_string()),
            title: None,
            new_type: WorkType::Article,
        };
        assert_eq!(ctx.reclassify(&ov)?, 1);

        let log: ReclassificationLog = ctx.store.load(snapshot::RECLASSIFICATIONS)?;
        assert_eq!(log.entries()[0].old_type, WorkType::Preprint);
        assert_eq!(log.entries()[0].new_type, WorkType::Article);

        let summary = ctx.bibtex(false)?;
        assert_eq!(summary.written, 1);
        let text = std::fs::read_to_string(&summary.path)?;
        assert!(text.contains("@article{"));
        assert!(!text.contains("@unpublished{"));
        assert!(text.contains("journal = {SocArXiv}"));
        Ok(())
    }

    #[test]
    fn test_manual_reclassification_survives_rerun() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);
        let mut preprint = work("Open source AI governance", Some("10.31235/osf.io/abc"), Source::Openalex);
        preprint.work_type = WorkType::Preprint;
        ctx.store.save(snapshot::DEDUPLICATED, &vec![preprint])?;

        ctx.classify()?;
        let ov = TypeOverride {
            doi: Some("10.31235/osf.io/abc".to_string()),
            title: None,
            new_type: WorkType::Article,
        };
        assert_eq!(ctx.reclassify(&ov)?, 1);

        let summary = ctx.classify()?;
        assert_eq!(summary.replayed, 1);

        let log: ReclassificationLog = ctx.store.load(snapshot::RECLASSIFICATIONS)?;
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].old_type, WorkType::Preprint);
        let classified: Vec<WorkRecord> = ctx.store.load(snapshot::CLASSIFIED)?;
        assert_eq!(classified[0].work_type, WorkType::Article);
        Ok(())
    }

    #[test]
    fn test_configured_override_is_logged_once() -> Result<()> {
        let dir = TempDir::new()?;
        let mut ctx = context(&dir);
        ctx.config.overrides = vec![TypeOverride {
            doi: Some("10.1/d".to_string()),
            title: None,
            new_type: WorkType::Dataset,
        }];
        ctx.store.save(
            snapshot::DEDUPLICATED,
            &vec![work("Survey responses", Some("10.1/d"), Source::Openalex)],
        )?;

        assert_eq!(ctx.classify()?.overrides_applied, 1);
        let again = ctx.classify()?;
        assert_eq!(again.replayed, 1);
        assert_eq!(again.overrides_applied, 0);

        let log: ReclassificationLog = ctx.store.load(snapshot::RECLASSIFICATIONS)?;
        assert_eq!(log.len(), 1);
        Ok(())
    }

    #[test]
    fn test_append_skips_existing_and_reserves_keys() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);

        let first = work("Open source AI governance", Some("10.1/a"), Source::Openalex);
        ctx.store.save(snapshot::CLASSIFIED, &vec![first.clone()])?;
        ctx.bibtex(false)?;

        let mut second = first.clone();
        second.title = "Open source AI regulation models".to_string();
        second.doi = Some("10.1/b".to_string());
        ctx.store.save(snapshot::CLASSIFIED, &vec![first, second])?;

        let summary = ctx.bibtex(true)?;
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.written, 1);

        let text = std::fs::read_to_string(&summary.path)?;
        let keys = bibtex::existing_keys(&text);
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
        assert!(text.contains("% Added by scholarcv on"));
        Ok(())
    }

    #[test]
    fn test_run_offline_end_to_end() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = context(&dir);
        let mut dataset = work("Open source survey data", None, Source::Openalex);
        dataset.work_type = WorkType::Dataset;
        ctx.store.save_feed(
            Feed::OpenAlex,
            &[
                work("Open source governance", Some("10.1/g"), Source::Openalex),
                work("Open source governance", None, Source::Openalex),
                dataset,
            ],
        )?;

        let summary = ctx.run_offline()?;
        assert_eq!(summary.written, 2);

        let deduplicated: Vec<WorkRecord> = ctx.store.load(snapshot::DEDUPLICATED)?;
        let again = dedup::deduplicate(deduplicated.clone(), &ctx.config.classification);
        assert_eq!(again.records.len(), deduplicated.len());

        let text = std::fs::read_to_string(&summary.path)?;
        assert!(text.contains("note = {Research Dataset}"));
        Ok(())
    }

    #[test]
    fn test_missing_merged_snapshot_is_missing_input() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, crate::error::CvError::MissingInput(_)));
        assert!(!ctx.store.path(snapshot::VALIDATED).exists());
    }
}
