//! Cross-source merge.
//!
//! Feeds are folded in priority order (OpenAlex, Lattes, Scholar BibTeX,
//! Scholar HTML, ResearchGate CSV, ResearchGate HTML). An incoming record
//! joins an existing one on equal DOI; failing that, and only when one side
//! has no DOI, on a title similarity at or above `fuzzy_title_merge`. Two
//! different DOIs never merge. Fields are taken from the highest-priority
//! record that has them, except citations, which take the maximum.

use crate::config::Thresholds;
use crate::record::{Feed, WorkRecord, WorkType};
use crate::similarity::title_similarity;
use crate::sources::orcid::OrcidSeed;
use crate::sources::SourceBatch;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Per-feed contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedStats {
    pub feed: Feed,
    pub records: usize,
    /// Feed snapshot was absent (an empty contribution)
    #[serde(default)]
    pub missing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub feeds: Vec<FeedStats>,
    pub input_records: usize,
    pub merged_records: usize,
    pub doi_matches: usize,
    pub fuzzy_matches: usize,
    /// Fuzzy matches whose years also agreed
    pub year_corroborated: usize,
    pub crossref_enriched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid_works: Option<usize>,
    /// DOIs ORCID lists that no feed produced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orcid_dois_missing: Vec<String>,
}

impl MergeReport {
    /// Flag feeds whose snapshots were absent.
    pub fn mark_missing(&mut self, feed: Feed) {
        match self.feeds.iter_mut().find(|s| s.feed == feed) {
            Some(stats) => stats.missing = true,
            None => self.feeds.push(FeedStats {
                feed,
                records: 0,
                missing: true,
            }),
        }
    }

    pub fn openalex_records(&self) -> usize {
        self.feeds
            .iter()
            .find(|s| s.feed == Feed::OpenAlex)
            .map_or(0, |s| s.records)
    }
}

pub struct Merger<'a> {
    thresholds: &'a Thresholds,
}

impl<'a> Merger<'a> {
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    /// Merge all batches. Batch order does not matter; feed priority does.
    pub fn merge(&self, mut batches: Vec<SourceBatch>) -> (Vec<WorkRecord>, MergeReport) {
        batches.sort_by_key(|b| b.feed.priority());

        let mut report = MergeReport::default();
        let mut merged: Vec<WorkRecord> = Vec::new();
        let mut by_doi: HashMap<String, usize> = HashMap::new();

        for batch in batches {
            report.feeds.push(FeedStats {
                feed: batch.feed,
                records: batch.records.len(),
                missing: false,
            });
            report.input_records += batch.records.len();

            for mut record in batch.records {
                if !record.merged_from.contains(&batch.feed) {
                    record.merged_from.push(batch.feed);
                }

                let target = match record.doi.as_ref().and_then(|d| by_doi.get(d)) {
                    Some(&idx) => {
                        report.doi_matches += 1;
                        Some(idx)
                    }
                    None => self.fuzzy_match(&merged, &record).map(|idx| {
                        report.fuzzy_matches += 1;
                        if merged[idx].year.is_some() && merged[idx].year == record.year {
                            report.year_corroborated += 1;
                        }
                        idx
                    }),
                };

                match target {
                    Some(idx) => {
                        debug!(
                            title = %merged[idx].short_title(),
                            feed = %batch.feed,
                            "Merging duplicate"
                        );
                        coalesce(&mut merged[idx], record);
                        if let Some(doi) = merged[idx].doi.clone() {
                            by_doi.entry(doi).or_insert(idx);
                        }
                    }
                    None => {
                        if let Some(doi) = record.doi.clone() {
                            by_doi.insert(doi, merged.len());
                        }
                        merged.push(record);
                    }
                }
            }
        }

        report.merged_records = merged.len();
        info!(
            input = report.input_records,
            merged = report.merged_records,
            doi_matches = report.doi_matches,
            fuzzy_matches = report.fuzzy_matches,
            "Merge complete"
        );
        (merged, report)
    }

    /// Best title match among merged records that the DOI rule allows.
    fn fuzzy_match(&self, merged: &[WorkRecord], record: &WorkRecord) -> Option<usize> {
        merged
            .iter()
            .enumerate()
            .filter(|(_, existing)| !(existing.has_doi() && record.has_doi()))
            .map(|(idx, existing)| (idx, title_similarity(&existing.title, &record.title)))
            .filter(|(_, score)| *score >= self.thresholds.fuzzy_title_merge)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }
}

/// Fill empty fields of `target` from `incoming`; citations take the max.
fn coalesce(target: &mut WorkRecord, incoming: WorkRecord) {
    fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
        if slot.is_none() {
            *slot = value;
        }
    }
    fn fill_vec<T>(slot: &mut Vec<T>, value: Vec<T>) {
        if slot.is_empty() {
            *slot = value;
        }
    }

    if target.title.trim().is_empty() {
        target.title = incoming.title;
    }
    if target.work_type == WorkType::Unknown {
        target.work_type = incoming.work_type;
    }
    fill(&mut target.year, incoming.year);
    fill(&mut target.venue, incoming.venue);
    fill(&mut target.doi, incoming.doi);
    fill(&mut target.url, incoming.url);
    fill(&mut target.abstract_text, incoming.abstract_text);
    fill(&mut target.biblio.volume, incoming.biblio.volume);
    fill(&mut target.biblio.issue, incoming.biblio.issue);
    fill(&mut target.biblio.first_page, incoming.biblio.first_page);
    fill(&mut target.biblio.last_page, incoming.biblio.last_page);
    fill_vec(&mut target.authors, incoming.authors);
    fill_vec(&mut target.keywords, incoming.keywords);
    fill_vec(&mut target.funders, incoming.funders);

    target.citations = target.citations.max(incoming.citations);
    target.open_access |= incoming.open_access;
    for feed in incoming.merged_from {
        if !target.merged_from.contains(&feed) {
            target.merged_from.push(feed);
        }
    }
}

/// Fill abstracts and funders from Crossref lookups sharing a DOI.
pub fn enrich_from_crossref(records: &mut [WorkRecord], crossref: &[WorkRecord]) -> usize {
    let lookup: HashMap<&str, &WorkRecord> = crossref
        .iter()
        .filter_map(|r| r.doi.as_deref().map(|d| (d, r)))
        .collect();

    let mut enriched = 0;
    for record in records.iter_mut() {
        let Some(found) = record.doi.as_deref().and_then(|d| lookup.get(d)) else {
            continue;
        };
        let mut changed = false;
        if record.abstract_text.is_none() && found.abstract_text.is_some() {
            record.abstract_text = found.abstract_text.clone();
            changed = true;
        }
        if record.funders.is_empty() && !found.funders.is_empty() {
            record.funders = found.funders.clone();
            changed = true;
        }
        if changed {
            if !record.merged_from.contains(&Feed::Crossref) {
                record.merged_from.push(Feed::Crossref);
            }
            enriched += 1;
        }
    }
    info!(enriched = enriched, "Crossref enrichment complete");
    enriched
}

/// Compare ORCID's work list with the merged set.
pub fn compare_with_orcid(report: &mut MergeReport, seed: &OrcidSeed, merged: &[WorkRecord]) {
    let known: HashSet<&str> = merged.iter().filter_map(|r| r.doi.as_deref()).collect();
    report.orcid_works = Some(seed.work_count);
    report.orcid_dois_missing = seed
        .dois
        .iter()
        .filter(|d| !known.contains(d.as_str()))
        .cloned()
        .collect();
    info!(
        orcid = seed.work_count,
        openalex = report.openalex_records(),
        missing_dois = report.orcid_dois_missing.len(),
        "Compared with ORCID"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;

    fn rec(title: &str, doi: Option<&str>, citations: u64) -> WorkRecord {
        let mut r = WorkRecord::new(title, Source::Openalex);
        r.doi = doi.map(str::to_string);
        r.citations = citations;
        r
    }

    fn batch(feed: Feed, records: Vec<WorkRecord>) -> SourceBatch {
        SourceBatch { feed, records }
    }

    #[test]
    fn test_doi_match_takes_max_citations_and_priority_fields() {
        let thresholds = Thresholds::default();
        let mut scholar = rec("open source ai (scholar)", Some("10.1/x"), 12);
        scholar.venue = Some("ISJ".to_string());
        let mut openalex = rec("Open Source AI", Some("10.1/x"), 5);
        openalex.year = Some(2021);

        // Lower-priority batch first: order of input must not matter.
        let (merged, report) = Merger::new(&thresholds).merge(vec![
            batch(Feed::ScholarHtml, vec![scholar]),
            batch(Feed::OpenAlex, vec![openalex]),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Open Source AI");
        assert_eq!(merged[0].citations, 12);
        assert_eq!(merged[0].venue.as_deref(), Some("ISJ"));
        assert_eq!(merged[0].merged_from, vec![Feed::OpenAlex, Feed::ScholarHtml]);
        assert_eq!(report.doi_matches, 1);
    }

    #[test]
    fn test_fuzzy_match_only_without_conflicting_dois() {
        let thresholds = Thresholds::default();
        let (merged, report) = Merger::new(&thresholds).merge(vec![
            batch(
                Feed::OpenAlex,
                vec![rec("Attractiveness of free software projects", Some("10.1/a"), 1)],
            ),
            batch(
                Feed::Lattes,
                vec![
                    rec("Attractiveness of Free Software Projects.", None, 3),
                    rec("Attractiveness of free software projects", Some("10.1/b"), 0),
                ],
            ),
        ]);

        assert_eq!(merged.len(), 2, "different DOIs never merge");
        assert_eq!(merged[0].citations, 3);
        assert_eq!(report.fuzzy_matches, 1);
    }

    #[test]
    fn test_fuzzy_threshold() {
        let thresholds = Thresholds::default();
        let (merged, _) = Merger::new(&thresholds).merge(vec![batch(
            Feed::ScholarHtml,
            vec![
                rec("Open source in government", None, 0),
                rec("Open source in education", None, 0),
            ],
        )]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let thresholds = Thresholds::default();
        let merger = Merger::new(&thresholds);
        let (first, _) = merger.merge(vec![
            batch(Feed::OpenAlex, vec![rec("A", Some("10.1/a"), 1), rec("B", None, 0)]),
            batch(Feed::Lattes, vec![rec("A", Some("10.1/a"), 2), rec("B", None, 4)]),
        ]);
        let (second, _) = merger.merge(vec![batch(Feed::OpenAlex, first.clone())]);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), first.len());
    }

    #[test]
    fn test_enrich_from_crossref() {
        let mut records = vec![rec("A", Some("10.1/a"), 0), rec("B", None, 0)];
        let mut found = rec("", Some("10.1/a"), 0);
        found.abstract_text = Some("Abstract".to_string());
        found.funders = vec!["CNPq".to_string()];

        assert_eq!(enrich_from_crossref(&mut records, &[found]), 1);
        assert_eq!(records[0].abstract_text.as_deref(), Some("Abstract"));
        assert!(records[0].merged_from.contains(&Feed::Crossref));
        assert!(records[1].funders.is_empty());
    }

    #[test]
    fn test_compare_with_orcid() {
        let mut report = MergeReport::default();
        let seed = OrcidSeed {
            orcid: "x".to_string(),
            work_count: 2,
            dois: vec!["10.1/a".to_string(), "10.1/z".to_string()],
        };
        compare_with_orcid(&mut report, &seed, &[rec("A", Some("10.1/a"), 0)]);
        assert_eq!(report.orcid_works, Some(2));
        assert_eq!(report.orcid_dois_missing, vec!["10.1/z"]);
    }
}
