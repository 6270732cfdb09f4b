//! Type-aware deduplication of the validated set.
//!
//! Records are grouped by normalised title and work type, so an article and
//! a dataset with the same title stay separate. Within a group the first
//! record is kept unless a later one has a better DOI: a DOI beats none and
//! a non-preprint DOI beats a preprint one.

use crate::config::ClassificationConfig;
use crate::record::{WorkRecord, WorkType};
use crate::similarity::collapse_whitespace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// A record that lost its group to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superseded {
    pub record: WorkRecord,
    /// Identity of the record kept instead
    pub kept: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub records: Vec<WorkRecord>,
    pub superseded: Vec<Superseded>,
}

impl DedupOutcome {
    pub fn duplicates_removed(&self) -> usize {
        self.superseded.len()
    }
}

/// Lowercase, drop a literal `(preprint)` marker, collapse whitespace.
pub fn group_title(title: &str) -> String {
    collapse_whitespace(&title.to_lowercase().replace("(preprint)", ""))
}

fn group_key(record: &WorkRecord) -> (String, WorkType) {
    (group_title(&record.title), record.work_type)
}

/// 0 = no DOI, 1 = preprint DOI, 2 = published DOI.
fn doi_rank(record: &WorkRecord, config: &ClassificationConfig) -> u8 {
    match record.doi.as_deref().filter(|d| !d.is_empty()) {
        None => 0,
        Some(doi) if config.is_preprint_doi(doi) => 1,
        Some(_) => 2,
    }
}

/// Collapse records sharing a grouping key. First-seen order is kept.
pub fn deduplicate(records: Vec<WorkRecord>, config: &ClassificationConfig) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut slots: HashMap<(String, WorkType), usize> = HashMap::new();

    for record in records {
        let key = group_key(&record);
        let Some(&idx) = slots.get(&key) else {
            slots.insert(key, outcome.records.len());
            outcome.records.push(record);
            continue;
        };

        let current = &mut outcome.records[idx];
        let loser = if doi_rank(&record, config) > doi_rank(current, config) {
            std::mem::replace(current, record)
        } else {
            record
        };
        debug!(
            title = %loser.short_title(),
            kept = %outcome.records[idx].identity(),
            "Removing duplicate"
        );
        outcome.superseded.push(Superseded {
            kept: outcome.records[idx].identity(),
            record: loser,
        });
    }

    info!(
        kept = outcome.records.len(),
        duplicates_removed = outcome.duplicates_removed(),
        "Deduplication complete"
    );
    outcome
}
