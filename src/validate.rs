//! Author identity and content validation.
//!
//! A work is validated when the target ORCID appears in its byline and its
//! content fits the author's profile. Everything else is excluded with a
//! reason; exclusion is an outcome, not an error. Records without a title
//! cannot be displayed and are only counted.

use crate::config::{AuthorProfile, PipelineConfig};
use crate::record::{ValidationStatus, WorkRecord, WorkType};
use crate::similarity::{name_similarity, normalize_text};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Reason attached when no expected area or institution matched.
pub const NO_PROFILE_MATCH: &str = "no matching research areas/institutions found";

/// A byline name that resembles one of the author's name variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameMatch {
    pub author: String,
    pub variant: String,
    pub score: f64,
}

/// An excluded work and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedWork {
    pub record: WorkRecord,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_name_matches: Vec<NameMatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub validated: Vec<WorkRecord>,
    pub excluded: Vec<ExcludedWork>,
    /// Records dropped for having no title
    pub dropped_untitled: usize,
    pub warnings: Vec<String>,
}

/// 1-based byline position of the first author whose ORCID contains `target`.
pub fn check_orcid(record: &WorkRecord, target: &str) -> Option<usize> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    record
        .authors
        .iter()
        .position(|a| a.orcid.as_deref().is_some_and(|o| o.contains(target)))
        .map(|idx| idx + 1)
}

/// Byline names scoring at least `threshold` against any name variant,
/// best score per author, highest first.
pub fn possible_name_matches(
    record: &WorkRecord,
    variants: &[String],
    threshold: f64,
) -> Vec<NameMatch> {
    let mut matches: Vec<NameMatch> = record
        .authors
        .iter()
        .filter_map(|author| {
            variants
                .iter()
                .map(|v| (v, name_similarity(&author.display_name, v)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .filter(|(_, score)| *score >= threshold)
                .map(|(variant, score)| NameMatch {
                    author: author.display_name.clone(),
                    variant: variant.clone(),
                    score,
                })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

/// Content check. `Err` carries the exclusion reason.
///
/// An unlikely-area keyword vetoes the work even when an expected area also
/// matches.
pub fn check_content(record: &WorkRecord, profile: &AuthorProfile) -> Result<(), String> {
    let mut blob = record.title.to_lowercase();
    for keyword in &record.keywords {
        blob.push(' ');
        blob.push_str(&keyword.to_lowercase());
    }

    if let Some(unlikely) = profile
        .unlikely_areas
        .iter()
        .find(|k| blob.contains(&k.to_lowercase()))
    {
        return Err(format!("unlikely research area: {}", unlikely));
    }

    let area_match = profile
        .expected_areas
        .iter()
        .any(|k| blob.contains(&k.to_lowercase()));
    if area_match {
        return Ok(());
    }

    let institution_match = record
        .authors
        .iter()
        .flat_map(|a| &a.institutions)
        .any(|inst| {
            let inst = inst.to_lowercase();
            profile
                .expected_institutions
                .iter()
                .any(|expected| inst.contains(&expected.to_lowercase()))
        });
    if institution_match {
        Ok(())
    } else {
        Err(NO_PROFILE_MATCH.to_string())
    }
}

/// Runs both checks against one author profile.
pub struct Validator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Attach a [`ValidationStatus`] to `record`. `Err` means excluded.
    pub fn validate(&self, mut record: WorkRecord) -> Result<WorkRecord, ExcludedWork> {
        let position = check_orcid(&record, self.config.bare_orcid());
        let mut status = ValidationStatus {
            orcid_verified: position.is_some(),
            author_position: position,
            ..Default::default()
        };

        let reason = match position {
            None => Some("target ORCID not found in author list".to_string()),
            Some(_) => match check_content(&record, &self.config.author) {
                Ok(()) => {
                    status.content_verified = true;
                    None
                }
                Err(reason) => Some(reason),
            },
        };

        match reason {
            None => {
                record.validation = Some(status);
                Ok(record)
            }
            Some(reason) => {
                let possible = if position.is_none() {
                    possible_name_matches(
                        &record,
                        &self.config.author.name_variants,
                        self.config.thresholds.possible_name_match,
                    )
                } else {
                    Vec::new()
                };
                status.exclusion_reason = Some(reason.clone());
                record.validation = Some(status);
                Err(ExcludedWork {
                    record,
                    reason,
                    possible_name_matches: possible,
                })
            }
        }
    }

    /// Partition `records` into validated and excluded.
    pub fn validate_all(&self, records: Vec<WorkRecord>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut seen: HashSet<(String, Option<i32>)> = HashSet::new();

        for record in records {
            if record.title.trim().is_empty() {
                debug!(doi = ?record.doi, "Dropping record without title");
                outcome.dropped_untitled += 1;
                continue;
            }

            if !record.has_doi() && record.work_type != WorkType::Dataset {
                outcome
                    .warnings
                    .push(format!("Missing DOI: {}", record.short_title()));
            }
            if !seen.insert((normalize_text(&record.title), record.year)) {
                outcome.warnings.push(format!(
                    "Potential duplicate: {} ({})",
                    record.short_title(),
                    record.year.map(|y| y.to_string()).unwrap_or_default()
                ));
            }

            match self.validate(record) {
                Ok(valid) => outcome.validated.push(valid),
                Err(excluded) => {
                    debug!(
                        title = %excluded.record.short_title(),
                        reason = %excluded.reason,
                        "Excluded"
                    );
                    outcome.excluded.push(excluded);
                }
            }
        }

        info!(
            validated = outcome.validated.len(),
            excluded = outcome.excluded.len(),
            dropped = outcome.dropped_untitled,
            warnings = outcome.warnings.len(),
            "Validation complete"
        );
        outcome
    }
}

/// Counts from merging manual additions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSummary {
    pub added: usize,
    pub duplicates: usize,
    pub untitled: usize,
}

/// Append operator-approved works to `validated`. An addition whose DOI is
/// already present is counted as a duplicate and skipped.
pub fn add_manual(validated: &mut Vec<WorkRecord>, additions: Vec<WorkRecord>) -> ManualSummary {
    let mut dois: HashSet<String> = validated.iter().filter_map(|r| r.doi.clone()).collect();
    let mut summary = ManualSummary::default();

    for mut record in additions {
        if record.title.trim().is_empty() {
            summary.untitled += 1;
            continue;
        }
        if let Some(doi) = record.doi.clone() {
            if !dois.insert(doi) {
                warn!(title = %record.short_title(), "Manual addition already validated");
                summary.duplicates += 1;
                continue;
            }
        }
        record.validation = Some(ValidationStatus {
            orcid_verified: true,
            content_verified: true,
            manually_approved: true,
            ..Default::default()
        });
        validated.push(record);
        summary.added += 1;
    }

    info!(
        added = summary.added,
        duplicates = summary.duplicates,
        "Merged manual additions"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuthorRef, Source};

    const ORCID: &str = "0000-0002-4481-0115";

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig {
            orcid: ORCID.to_string(),
            ..Default::default()
        };
        config.author.name_variants = vec![
            "Carlos Denner dos Santos".to_string(),
            "C. Denner dos Santos".to_string(),
        ];
        config
    }

    fn work(title: &str, author: AuthorRef) -> WorkRecord {
        let mut r = WorkRecord::new(title, Source::Openalex);
        r.doi = Some("10.1/x".to_string());
        r.authors = vec![AuthorRef::named("Maria Silva"), author];
        r
    }

    fn target() -> AuthorRef {
        AuthorRef {
            display_name: "Carlos Denner dos Santos".to_string(),
            orcid: Some(format!("https://orcid.org/{}", ORCID)),
            institutions: vec!["Universidade de Brasília".to_string()],
        }
    }

    #[test]
    fn test_check_orcid_position() {
        let record = work("Open source governance", target());
        assert_eq!(check_orcid(&record, ORCID), Some(2));
        assert_eq!(check_orcid(&record, ""), None);
    }

    #[test]
    fn test_name_similarity_never_verifies() {
        let config = config();
        let record = work(
            "Open source governance",
            AuthorRef::named("Carlos Denner dos Santos"),
        );
        let excluded = Validator::new(&config).validate(record).unwrap_err();
        let status = excluded.record.validation.as_ref().unwrap();
        assert!(!status.orcid_verified);
        assert!(excluded.reason.contains("ORCID"));
        assert_eq!(excluded.possible_name_matches.len(), 1);
        assert_eq!(excluded.possible_name_matches[0].score, 1.0);
    }

    #[test]
    fn test_unlikely_area_vetoes_expected_area() {
        let profile = AuthorProfile::default();
        let record = work("Open source tools for eucalyptus forestry", target());
        let reason = check_content(&record, &profile).unwrap_err();
        assert!(reason.contains("eucalyptus"));
    }

    #[test]
    fn test_content_checks_keywords_and_institutions() {
        let profile = AuthorProfile::default();

        let mut by_keyword = work("A study", AuthorRef::named("x"));
        by_keyword.keywords = vec!["Software Engineering".to_string()];
        assert!(check_content(&by_keyword, &profile).is_ok());

        let by_institution = work("A study", target());
        assert!(check_content(&by_institution, &profile).is_ok());

        let mut shouting = target();
        shouting.institutions = vec!["UNIVERSIDADE DE BRASÍLIA".to_string()];
        assert!(check_content(&work("A study", shouting), &profile).is_ok());

        let neither = work("A study", AuthorRef::named("x"));
        assert_eq!(
            check_content(&neither, &profile).unwrap_err(),
            NO_PROFILE_MATCH
        );
    }

    #[test]
    fn test_validate_all_partitions_and_counts() {
        let config = config();
        let mut dataset = work("Open source dataset", target());
        dataset.doi = None;
        dataset.work_type = WorkType::Dataset;
        let mut no_doi = work("Open source practice", target());
        no_doi.doi = None;

        let records = vec![
            work("Open source governance", target()),
            work("Open source governance", target()),
            WorkRecord::new("  ", Source::Scholar),
            work("Bacteria in soil", target()),
            dataset,
            no_doi,
        ];
        let outcome = Validator::new(&config).validate_all(records);

        assert_eq!(outcome.validated.len(), 4);
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.dropped_untitled, 1);
        assert!(outcome.validated[0].is_validated());
        assert_eq!(
            outcome.validated[0].validation.as_ref().unwrap().author_position,
            Some(2)
        );
        let missing_doi: Vec<_> = outcome
            .warnings
            .iter()
            .filter(|w| w.starts_with("Missing DOI"))
            .collect();
        assert_eq!(missing_doi.len(), 1, "datasets are exempt");
        assert!(outcome.warnings.iter().any(|w| w.starts_with("Potential duplicate")));
    }

    #[test]
    fn test_add_manual() {
        let mut validated = vec![work("Existing", target())];
        let mut fresh = WorkRecord::new("Fresh", Source::Lattes);
        fresh.doi = Some("10.9/new".to_string());
        let additions = vec![work("Existing again", target()), fresh];

        let summary = add_manual(&mut validated, additions);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(validated.len(), 2);
        let status = validated[1].validation.as_ref().unwrap();
        assert!(status.manually_approved && status.is_validated());
    }
}
