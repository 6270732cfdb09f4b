//! Pipeline configuration loaded from `profiles.yaml`.
//!
//! Every stage receives a [`PipelineConfig`]; nothing reads paths, keyword
//! lists or similarity cutoffs from module-level constants.

use crate::error::{CvError, Result};
use crate::record::WorkType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default profile file name
pub const PROFILE_FILE: &str = "profiles.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target author's ORCID (bare id or orcid.org URL)
    pub orcid: String,
    /// Contact email for polite API access
    pub mailto: String,
    /// Template name consumed by the document renderer
    pub template: String,
    pub author: AuthorProfile,
    pub thresholds: Thresholds,
    pub classification: ClassificationConfig,
    pub paths: Paths,
    pub http: HttpConfig,
    pub bibtex: BibtexConfig,
    /// Manual reclassifications applied during classification
    pub overrides: Vec<TypeOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orcid: String::new(),
            mailto: String::new(),
            template: "markdown".to_string(),
            author: AuthorProfile::default(),
            thresholds: Thresholds::default(),
            classification: ClassificationConfig::default(),
            paths: Paths::default(),
            http: HttpConfig::default(),
            bibtex: BibtexConfig::default(),
            overrides: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a YAML profile.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CvError::MissingInput(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), orcid = %config.bare_orcid(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the profile path: explicit path, `./profiles.yaml`, then the
    /// user config directory.
    pub fn discover(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        let local = PathBuf::from(PROFILE_FILE);
        if local.exists() {
            return Ok(local);
        }
        let user = dirs::config_dir()
            .map(|d| d.join("scholarcv").join(PROFILE_FILE))
            .ok_or_else(|| CvError::Config("Cannot determine config directory".to_string()))?;
        debug!(path = %user.display(), "Falling back to user config directory");
        if user.exists() {
            Ok(user)
        } else {
            Err(CvError::MissingInput(local))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bare_orcid().is_empty() {
            return Err(CvError::Config("orcid must be set".to_string()));
        }
        self.thresholds.validate()?;
        for ov in &self.overrides {
            ov.check()?;
        }
        Ok(())
    }

    /// ORCID without any `orcid.org/` prefix.
    pub fn bare_orcid(&self) -> &str {
        let trimmed = self.orcid.trim();
        match trimmed.rfind("orcid.org/") {
            Some(idx) => &trimmed[idx + "orcid.org/".len()..],
            None => trimmed,
        }
    }
}

/// Who the target author is and what they work on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorProfile {
    /// Accepted spellings of the author's name
    pub name_variants: Vec<String>,
    /// Surname used by the existing-bibliography audit
    pub surname: Option<String>,
    pub expected_areas: Vec<String>,
    /// Any match vetoes content verification
    pub unlikely_areas: Vec<String>,
    pub expected_institutions: Vec<String>,
}

impl Default for AuthorProfile {
    fn default() -> Self {
        Self {
            name_variants: Vec::new(),
            surname: None,
            expected_areas: [
                "information systems",
                "software engineering",
                "open source",
                "IT governance",
                "artificial intelligence",
                "AI governance",
                "crowdsourcing",
                "software quality",
                "management information systems",
                "data science",
                "business intelligence",
                "public sector IT",
                "free software",
                "FOSS",
                "software metrics",
                "source code",
                "technology governance",
                "information technology",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unlikely_areas: [
                "bacteria",
                "plant disease",
                "eucalyptus",
                "phytopathology",
                "microbiology",
                "botany",
                "agriculture",
                "forestry",
                "medical",
                "clinical",
                "surgery",
                "pharmaceutical",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            expected_institutions: [
                "University of Brasília",
                "Universidade de Brasília",
                "UnB",
                "Southern Illinois University",
                "UQAM",
                "Université du Québec à Montréal",
                "UFMG",
                "Universidade Federal de Minas Gerais",
                "Université de Sherbrooke",
                "Bell Canada",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl AuthorProfile {
    /// Configured surname, else the last token of the first name variant.
    pub fn target_surname(&self) -> Option<String> {
        self.surname
            .clone()
            .or_else(|| {
                self.name_variants
                    .first()
                    .and_then(|n| n.split_whitespace().last())
                    .map(str::to_string)
            })
            .map(|s| crate::similarity::normalize_text(&s))
            .filter(|s| !s.is_empty())
    }
}

/// Similarity cutoffs, all in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Cross-source title match for records without a shared DOI
    pub fuzzy_title_merge: f64,
    /// Byline name reported as a possible (unverified) match
    pub possible_name_match: f64,
    /// Title similarity alone marks an existing-bib duplicate
    pub audit_title_strong: f64,
    /// Title similarity when the target surname appears in both bylines
    pub audit_title_with_author: f64,
    /// Keyword overlap when the target surname appears in both bylines
    pub audit_keywords_with_author: f64,
    /// Title similarity and keyword overlap both at least this
    pub audit_combined: f64,
    /// Keyword overlap alone
    pub audit_keywords_only: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fuzzy_title_merge: 0.92,
            possible_name_match: 0.70,
            audit_title_strong: 0.80,
            audit_title_with_author: 0.65,
            audit_keywords_with_author: 0.65,
            audit_combined: 0.55,
            audit_keywords_only: 0.75,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("fuzzy_title_merge", self.fuzzy_title_merge),
            ("possible_name_match", self.possible_name_match),
            ("audit_title_strong", self.audit_title_strong),
            ("audit_title_with_author", self.audit_title_with_author),
            ("audit_keywords_with_author", self.audit_keywords_with_author),
            ("audit_combined", self.audit_combined),
            ("audit_keywords_only", self.audit_keywords_only),
        ];
        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                return Err(CvError::Config(format!(
                    "threshold {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// How `peer-review` works are rendered. Earlier generation passes disagreed,
/// so this is an explicit choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeerReviewMapping {
    #[default]
    Article,
    Misc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub peer_review: PeerReviewMapping,
    /// Case-sensitive substrings of venue/title marking a conference paper
    pub conference_indicators: Vec<String>,
    /// Case-insensitive venue words marking a journal
    pub journal_keywords: Vec<String>,
    /// Case-insensitive publisher names marking a journal
    pub publisher_names: Vec<String>,
    /// DOI prefixes of preprint servers (arXiv, SocArXiv/OSF, bioRxiv, SSRN, Preprints.org)
    pub preprint_doi_prefixes: Vec<String>,
}

impl ClassificationConfig {
    /// True for a DOI issued by a preprint server, or one that says so.
    pub fn is_preprint_doi(&self, doi: &str) -> bool {
        let doi = doi.trim().to_lowercase();
        doi.contains("preprint")
            || self
                .preprint_doi_prefixes
                .iter()
                .any(|p| doi.starts_with(&p.to_lowercase()))
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            peer_review: PeerReviewMapping::default(),
            conference_indicators: [
                "AMCIS",
                "Americas Conference on Information Systems",
                "ICIS",
                "Annual Hawaii International Conference on System Sciences",
                "HICSS",
                "Proceedings of",
                "Workshop",
                "Conference",
                "Congresso",
                "CATI",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            journal_keywords: ["Revista", "Journal", "Review", "Transactions", "Letters", "Magazine"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            publisher_names: ["IEEE", "ACM", "Science", "Nature", "PLOS", "BMC", "Springer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preprint_doi_prefixes: ["10.48550/", "10.31235/", "10.1101/", "10.2139/", "10.20944/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Snapshot directory
    pub data_dir: PathBuf,
    pub lattes_xml: PathBuf,
    pub scholar_html: PathBuf,
    pub scholar_bibtex: PathBuf,
    pub researchgate_csv: PathBuf,
    pub researchgate_html: PathBuf,
    /// JSON list of manually approved works
    pub manual_additions: PathBuf,
    pub output_bib: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/processed"),
            lattes_xml: PathBuf::from("data/raw/lattes.xml"),
            scholar_html: PathBuf::from("data/raw/scholar_profile.html"),
            scholar_bibtex: PathBuf::from("data/raw/scholar.bib"),
            researchgate_csv: PathBuf::from("data/raw/researchgate_export.csv"),
            researchgate_html: PathBuf::from("data/raw/researchgate_profile.html"),
            manual_additions: PathBuf::from("data/raw/manual_additions.json"),
            output_bib: PathBuf::from("data/latex/publications.bib"),
        }
    }
}

/// Outbound HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Fixed pause between sequential requests
    pub request_delay_ms: u64,
    /// Retries on HTTP 429 only
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_delay_ms: 100,
            max_retries: 3,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BibtexConfig {
    pub sentence_case_titles: bool,
    /// Author line written into the file header
    pub header_author: Option<String>,
}

impl Default for BibtexConfig {
    fn default() -> Self {
        Self {
            sentence_case_titles: true,
            header_author: None,
        }
    }
}

/// A manual reclassification: the record is matched by DOI, or by title
/// when no DOI is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeOverride {
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub new_type: WorkType,
}

impl TypeOverride {
    /// Types an operator may force.
    pub const ALLOWED: [WorkType; 5] = [
        WorkType::Article,
        WorkType::Preprint,
        WorkType::BookChapter,
        WorkType::Dataset,
        WorkType::PeerReview,
    ];

    pub fn check(&self) -> Result<()> {
        if !Self::ALLOWED.contains(&self.new_type) {
            return Err(CvError::Validation(format!(
                "cannot reclassify to '{}'",
                self.new_type
            )));
        }
        if self.doi.is_none() && self.title.is_none() {
            return Err(CvError::Validation(
                "override needs a doi or a title".to_string(),
            ));
        }
        Ok(())
    }
}
