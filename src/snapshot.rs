//! JSON snapshots persisted between pipeline stages.
//!
//! Each stage reads its whole input snapshot and writes a whole output
//! snapshot. Writes land in a sibling temporary file first and are renamed
//! into place, so an aborted stage never leaves a half-written file behind.

use crate::error::{CvError, Result};
use crate::record::{Feed, WorkRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MERGED: &str = "merged.json";
pub const MERGE_REPORT: &str = "merge_report.json";
pub const VALIDATED: &str = "validated.json";
pub const EXCLUDED: &str = "excluded.json";
pub const VALIDATION_REPORT: &str = "validation_report.json";
pub const DEDUPLICATED: &str = "deduplicated.json";
pub const SUPERSEDED: &str = "superseded.json";
pub const BIB_DUPLICATES: &str = "bib_duplicates.json";
pub const CLASSIFIED: &str = "classified.json";
pub const RECLASSIFICATIONS: &str = "reclassifications.json";
pub const ORCID_SEED: &str = "orcid_seed.json";

/// Snapshot directory handle.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Location of a per-feed snapshot.
    pub fn feed_path(&self, feed: Feed) -> PathBuf {
        self.root
            .join("sources")
            .join(format!("{}.json", feed.file_stem()))
    }

    /// Load a required snapshot. A missing file is [`CvError::MissingInput`].
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        read_json(&self.path(name))
    }

    /// Load an optional snapshot, falling back to `T::default()`.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        if !path.exists() {
            debug!(path = %path.display(), "Snapshot absent, using default");
            return Ok(T::default());
        }
        read_json(&path)
    }

    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(name);
        write_json(&path, value)?;
        Ok(path)
    }

    /// Records of one feed. A missing feed is an empty contribution.
    pub fn load_feed(&self, feed: Feed) -> Result<Option<Vec<WorkRecord>>> {
        let path = self.feed_path(feed);
        if !path.exists() {
            warn!(feed = %feed, path = %path.display(), "Source snapshot missing, contributing nothing");
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn save_feed(&self, feed: Feed, records: &[WorkRecord]) -> Result<PathBuf> {
        let path = self.feed_path(feed);
        write_json(&path, records)?;
        info!(feed = %feed, count = records.len(), "Saved source snapshot");
        Ok(path)
    }
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(CvError::MissingInput(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "Loaded snapshot");
    Ok(value)
}

/// Serialize to pretty JSON and atomically replace `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CvError::Config(format!("Not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    debug!(path = %path.display(), "Wrote snapshot");
    Ok(())
}
