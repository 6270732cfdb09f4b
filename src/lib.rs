//! # scholarcv
//!
//! Academic CV publication pipeline: collect records about one author from
//! several sources, keep the ones that really are theirs, merge and
//! deduplicate them, settle their types and render a BibTeX bibliography.
//!
//! ## Modules
//!
//! - [`sources`] - OpenAlex, Crossref and ORCID clients; Lattes, Scholar and
//!   ResearchGate file parsers
//! - [`merge`] - cross-source merge by DOI and fuzzy title
//! - [`validate`] - ORCID identity and research-profile checks
//! - [`dedup`] - type-aware deduplication
//! - [`classify`] - entry-kind mapping, overrides, conference heuristic
//! - [`bibtex`] - rendering, reading and writing `.bib` files
//! - [`audit`] - duplicate check against an existing bibliography
//! - [`pipeline`] - stage orchestration over JSON snapshots
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scholarcv::{config::PipelineConfig, pipeline::PipelineContext};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load("profiles.yaml".as_ref())?;
//!     let summary = PipelineContext::new(config).run_offline()?;
//!     println!("Wrote {} entries", summary.written);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod bibtex;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod similarity;
pub mod snapshot;
pub mod sources;
pub mod validate;

pub use error::{CvError, Result};
