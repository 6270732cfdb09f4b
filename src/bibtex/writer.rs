//! Writing `.bib` files.

use super::entry::BibEntry;
use crate::config::BibtexConfig;
use crate::error::Result;
use chrono::Local;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Comment header placed at the top of a generated file.
pub fn header(config: &BibtexConfig, count: usize) -> String {
    let mut lines = vec![
        "% BibTeX Bibliography File".to_string(),
        format!("% Generated by scholarcv {}", env!("CARGO_PKG_VERSION")),
        format!("% Generated: {}", Local::now().format("%Y-%m-%dT%H:%M:%S")),
    ];
    if let Some(author) = config.header_author.as_deref() {
        lines.push(format!("% Author: {}", author));
    }
    lines.extend([
        format!("% Total Entries: {}", count),
        "%".to_string(),
        "% Usage in LaTeX:".to_string(),
        "%   \\bibliography{publications}".to_string(),
        "%   \\bibliographystyle{plain}".to_string(),
        "%".to_string(),
    ]);
    lines.join("\n")
}

/// Full file text: header, blank line, entries separated by blank lines.
pub fn render_file(config: &BibtexConfig, entries: &[BibEntry]) -> String {
    let body = entries
        .iter()
        .map(BibEntry::to_bibtex)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}\n", header(config, entries.len()), body)
}

/// Replace `path` with a freshly generated bibliography.
pub fn write_bibliography(path: &Path, config: &BibtexConfig, entries: &[BibEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("bib.tmp");
    std::fs::write(&tmp, render_file(config, entries))?;
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), entries = entries.len(), "Wrote bibliography");
    Ok(())
}

/// Append entries to an existing file under a dated comment, leaving the
/// existing content untouched.
pub fn append_entries(path: &Path, entries: &[BibEntry]) -> Result<usize> {
    if entries.is_empty() {
        return Ok(0);
    }
    let mut text = format!(
        "\n\n% Added by scholarcv on {}\n\n",
        Local::now().format("%Y-%m-%d")
    );
    text.push_str(
        &entries
            .iter()
            .map(BibEntry::to_bibtex)
            .collect::<Vec<_>>()
            .join("\n\n"),
    );
    text.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())?;
    info!(path = %path.display(), appended = entries.len(), "Appended entries");
    Ok(entries.len())
}
