//! scholarcv - academic CV publication pipeline
//!
//! Collects an author's works from OpenAlex, Crossref, ORCID, a Lattes
//! export and saved Scholar/ResearchGate pages, validates authorship, merges
//! and deduplicates, and renders a BibTeX bibliography.
//!
//! ## Usage
//!
//! ```bash
//! scholarcv fetch                # remote sources
//! scholarcv ingest               # local exports
//! scholarcv run                  # merge -> validate -> dedup -> classify -> bibtex
//! scholarcv bibtex --append      # add new works to an existing .bib
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scholarcv::classify::ReclassificationLog;
use scholarcv::config::{PipelineConfig, TypeOverride};
use scholarcv::merge::MergeReport;
use scholarcv::pipeline::{BibSummary, PipelineContext};
use scholarcv::record::{WorkRecord, WorkType};
use scholarcv::report::ValidationReport;
use scholarcv::snapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Academic CV publication pipeline
#[derive(Parser)]
#[command(name = "scholarcv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Profile file (defaults to ./profiles.yaml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch OpenAlex works, Crossref metadata and the ORCID works list
    Fetch,

    /// Parse local exports (Lattes XML, Scholar HTML/BibTeX, ResearchGate CSV/HTML)
    Ingest,

    /// Merge all source snapshots
    Merge,

    /// Validate authorship of merged works
    Validate {
        /// Print every excluded work with its reason
        #[arg(long)]
        show_excluded: bool,
    },

    /// Remove duplicates from the validated set
    Dedup,

    /// Re-derive types from the deduplicated set, replaying logged changes and configured overrides
    Classify,

    /// Force the type of one work
    Reclassify {
        /// Match by DOI
        #[arg(long)]
        doi: Option<String>,

        /// Match by title (normalised comparison)
        #[arg(long)]
        title: Option<String>,

        /// New type: article, preprint, book-chapter, dataset or peer-review
        #[arg(long)]
        to: String,
    },

    /// Detect conference papers filed as journal articles
    Conferences {
        /// Also convert articles without any journal signal
        #[arg(long)]
        aggressive: bool,

        /// Undo the logged change with this index instead
        #[arg(long, conflicts_with = "aggressive")]
        revert: Option<usize>,
    },

    /// Render the classified set to BibTeX
    Bibtex {
        /// Append new works to the existing file instead of rewriting it
        #[arg(long)]
        append: bool,
    },

    /// Run every offline stage (optionally fetching and ingesting first)
    Run {
        /// Fetch remote sources first
        #[arg(long)]
        fetch: bool,

        /// Ingest local exports first
        #[arg(long)]
        ingest: bool,
    },

    /// Print the latest stage reports
    Summary,

    /// Export the classified set as CSV
    Export {
        /// Output CSV path
        #[arg(short, long, default_value = "publications.csv")]
        output: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let config_path = PipelineConfig::discover(cli.config.as_deref())
        .context("Failed to locate profile file")?;
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let ctx = PipelineContext::new(config);

    let result = match cli.command {
        Commands::Fetch => run_fetch(&ctx).await,
        Commands::Ingest => run_ingest(&ctx),
        Commands::Merge => run_merge(&ctx),
        Commands::Validate { show_excluded } => run_validate(&ctx, show_excluded),
        Commands::Dedup => run_dedup(&ctx),
        Commands::Classify => run_classify(&ctx),
        Commands::Reclassify { doi, title, to } => run_reclassify(&ctx, doi, title, &to),
        Commands::Conferences { aggressive, revert } => run_conferences(&ctx, aggressive, revert),
        Commands::Bibtex { append } => run_bibtex(&ctx, append),
        Commands::Run { fetch, ingest } => run_all(&ctx, fetch, ingest).await,
        Commands::Summary => run_summary(&ctx),
        Commands::Export { output } => run_export(&ctx, &output),
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

// ============================================================================
// Stages
// ============================================================================

async fn run_fetch(ctx: &PipelineContext) -> Result<()> {
    println!("\n--- Stage 1: Fetch Remote Sources ---");
    let summary = ctx.fetch().await.context("Remote fetch failed")?;
    println!("OpenAlex: {} works", summary.openalex);
    println!("Crossref: {} DOIs matched", summary.crossref);
    println!("ORCID:    {} work groups", summary.orcid_works);
    Ok(())
}

fn run_ingest(ctx: &PipelineContext) -> Result<()> {
    println!("\n--- Stage 1: Ingest Local Exports ---");
    for (feed, count) in ctx.ingest().context("Local ingestion failed")? {
        match count {
            Some(n) => println!("{:<20} {} records", feed.to_string(), n),
            None => println!("{:<20} (file not found)", feed.to_string()),
        }
    }
    Ok(())
}

fn run_merge(ctx: &PipelineContext) -> Result<()> {
    println!("\n--- Stage 2: Merge Sources ---");
    let report = ctx.merge().context("Merge failed")?;
    print_merge_report(&report);
    Ok(())
}

fn run_validate(ctx: &PipelineContext, show_excluded: bool) -> Result<()> {
    println!("\n--- Stage 3: Validate Authorship ---");
    let report = ctx.validate().context("Validation failed")?;
    print!("{}", report.render_text());

    if show_excluded {
        let excluded = ctx.excluded().context("Failed to read excluded works")?;
        println!("\nExcluded works:");
        for (i, work) in excluded.iter().enumerate() {
            println!("{:>4}. {} ({})", i + 1, work.record.title, work.reason);
            for m in &work.possible_name_matches {
                println!("        possible name match: {} ~ {} ({:.2})", m.author, m.variant, m.score);
            }
        }
    }
    Ok(())
}

fn run_dedup(ctx: &PipelineContext) -> Result<()> {
    println!("\n--- Stage 4: Deduplicate ---");
    let outcome = ctx.dedup().context("Deduplication failed")?;
    println!("Kept: {}", outcome.records.len());
    println!("Duplicates removed: {}", outcome.duplicates_removed());
    for s in &outcome.superseded {
        println!("  - {} (kept {})", s.record.short_title(), s.kept);
    }
    Ok(())
}

fn run_classify(ctx: &PipelineContext) -> Result<()> {
    println!("\n--- Stage 5: Classify ---");
    let summary = ctx.classify().context("Classification failed")?;
    println!("Records: {}", summary.records);
    println!("Logged changes replayed: {}", summary.replayed);
    println!("Overrides applied: {}", summary.overrides_applied);
    Ok(())
}

fn run_reclassify(
    ctx: &PipelineContext,
    doi: Option<String>,
    title: Option<String>,
    to: &str,
) -> Result<()> {
    let new_type = WorkType::from_label(to);
    if new_type == WorkType::Unknown {
        anyhow::bail!("Unknown type: {}", to);
    }
    let ov = TypeOverride {
        doi,
        title,
        new_type,
    };
    let changed = ctx.reclassify(&ov).context("Reclassification failed")?;
    println!("Reclassified {} work(s) to {}", changed, new_type);
    Ok(())
}

fn run_conferences(ctx: &PipelineContext, aggressive: bool, revert: Option<usize>) -> Result<()> {
    if let Some(index) = revert {
        let reverted = ctx.revert(index).context("Revert failed")?;
        println!("Reverted change #{} on {} work(s)", index, reverted);
        return Ok(());
    }
    let converted = ctx
        .detect_conferences(aggressive)
        .context("Conference detection failed")?;
    println!("Converted {} article(s) to conference papers", converted);
    Ok(())
}

fn run_bibtex(ctx: &PipelineContext, append: bool) -> Result<()> {
    println!("\n--- Stage 6: Generate BibTeX ---");
    let summary = ctx.bibtex(append).context("BibTeX generation failed")?;
    print_bib_summary(&summary, append);
    Ok(())
}

async fn run_all(ctx: &PipelineContext, fetch: bool, ingest: bool) -> Result<()> {
    if fetch {
        run_fetch(ctx).await?;
    }
    if ingest {
        run_ingest(ctx)?;
    }
    run_merge(ctx)?;
    run_validate(ctx, false)?;
    run_dedup(ctx)?;
    run_classify(ctx)?;
    run_bibtex(ctx, false)?;
    info!("Pipeline complete");
    Ok(())
}

fn run_summary(ctx: &PipelineContext) -> Result<()> {
    let store = &ctx.store;

    if store.path(snapshot::MERGE_REPORT).exists() {
        let report: MergeReport = store.load(snapshot::MERGE_REPORT)?;
        println!("\n--- Merge ---");
        print_merge_report(&report);
    }
    if store.path(snapshot::VALIDATION_REPORT).exists() {
        let report: ValidationReport = store.load(snapshot::VALIDATION_REPORT)?;
        println!("\n--- Validation ---");
        print!("{}", report.render_text());
    }
    if store.path(snapshot::CLASSIFIED).exists() {
        let classified: Vec<WorkRecord> = store.load(snapshot::CLASSIFIED)?;
        let log: ReclassificationLog = store.load_or_default(snapshot::RECLASSIFICATIONS)?;
        println!("\n--- Classification ---");
        println!("Classified works: {}", classified.len());
        println!("Logged type changes: {}", log.len());
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_merge_report(report: &MergeReport) {
    for stats in &report.feeds {
        if stats.missing {
            println!("{:<20} (missing)", stats.feed.to_string());
        } else {
            println!("{:<20} {}", stats.feed.to_string(), stats.records);
        }
    }
    println!("Input records:  {}", report.input_records);
    println!("Merged records: {}", report.merged_records);
    println!(
        "Matches: {} by DOI, {} by title ({} with matching year)",
        report.doi_matches, report.fuzzy_matches, report.year_corroborated
    );
    if report.crossref_enriched > 0 {
        println!("Crossref enriched: {}", report.crossref_enriched);
    }
    if let Some(orcid) = report.orcid_works {
        println!(
            "ORCID works: {} (OpenAlex: {}), {} ORCID DOIs not found",
            orcid,
            report.openalex_records(),
            report.orcid_dois_missing.len()
        );
    }
}

fn print_bib_summary(summary: &BibSummary, append: bool) {
    let verb = if append { "Appended" } else { "Wrote" };
    println!("{} {} entries to {}", verb, summary.written, summary.path.display());
    if summary.already_present > 0 {
        println!("Already in bibliography: {}", summary.already_present);
    }
    if summary.skipped > 0 {
        println!("Skipped (no title): {}", summary.skipped);
    }
    for (idx, reason) in &summary.failed {
        println!("Failed record #{}: {}", idx, reason);
    }
}

/// Flat row for the CSV export.
#[derive(Serialize)]
struct PublicationRow<'a> {
    title: &'a str,
    year: Option<i32>,
    #[serde(rename = "type")]
    work_type: WorkType,
    venue: Option<&'a str>,
    doi: Option<&'a str>,
    url: Option<&'a str>,
    citations: u64,
    authors: String,
}

fn run_export(ctx: &PipelineContext, output: &Path) -> Result<()> {
    let classified: Vec<WorkRecord> = ctx
        .store
        .load(snapshot::CLASSIFIED)
        .context("No classified works to export")?;
    let rows: Vec<PublicationRow> = classified
        .iter()
        .map(|r| PublicationRow {
            title: &r.title,
            year: r.year,
            work_type: r.work_type,
            venue: r.venue.as_deref(),
            doi: r.doi.as_deref(),
            url: r.url.as_deref(),
            citations: r.citations,
            authors: r
                .authors
                .iter()
                .map(|a| a.display_name.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        })
        .collect();
    save_csv(output, &rows)
}

fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    if data.is_empty() {
        println!("No data to save to {:?}", path);
        return Ok(());
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for item in data {
        wtr.serialize(item).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    println!("Saved: {:?}", path);
    Ok(())
}
