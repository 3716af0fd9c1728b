//! Incremental scan classification
//!
//! Compares every discovered file against the catalog by size and mtime
//! (millisecond precision). A file whose stat fails is treated as changed so
//! the pipeline gets a chance to report the failure.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::metadata_extractor::file_mtime;
use crate::models::{CandidateFile, CatalogEntry};

/// Result of comparing discovery output with the catalog
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub new_files: Vec<CandidateFile>,
    pub changed_files: Vec<CandidateFile>,
    /// Unchanged files paired with their stored entry
    pub unchanged_files: Vec<(CandidateFile, CatalogEntry)>,
    /// Catalog paths that were not discovered this run
    pub deleted_paths: Vec<String>,
    /// Catalog path -> row id
    pub path_to_id: HashMap<String, String>,
}

impl ChangeSet {
    /// Files that need metadata extraction, new first
    pub fn files_to_process(&self) -> Vec<CandidateFile> {
        self.new_files
            .iter()
            .chain(self.changed_files.iter())
            .cloned()
            .collect()
    }
}

/// Stored size/mtime differs from the live file
fn has_changed(entry: &CatalogEntry, path: &Path) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Stat failed, treating file as changed");
            return true;
        }
    };

    let Ok(mtime) = file_mtime(&metadata) else {
        return true;
    };

    metadata.len() as i64 != entry.file_size
        || mtime.timestamp_millis() != entry.last_modified.timestamp_millis()
}

/// Classify candidates into new/changed/unchanged
///
/// Blocking: stats every known file. Run inside `spawn_blocking`.
pub fn detect_changes(candidates: Vec<CandidateFile>, catalog: Vec<CatalogEntry>) -> ChangeSet {
    let path_to_id: HashMap<String, String> = catalog
        .iter()
        .map(|e| (e.file_path.clone(), e.id.clone()))
        .collect();
    let mut by_path: HashMap<String, CatalogEntry> = catalog
        .into_iter()
        .map(|e| (e.file_path.clone(), e))
        .collect();

    let mut set = ChangeSet::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());

    for candidate in candidates {
        seen.insert(candidate.file_path.clone());
        let changed = by_path
            .get(&candidate.file_path)
            .map(|entry| has_changed(entry, Path::new(&candidate.file_path)));

        match changed {
            None => set.new_files.push(candidate),
            Some(true) => set.changed_files.push(candidate),
            Some(false) => {
                if let Some(entry) = by_path.remove(&candidate.file_path) {
                    set.unchanged_files.push((candidate, entry));
                }
            }
        }
    }

    let mut deleted_paths: Vec<String> = path_to_id
        .keys()
        .filter(|path| !seen.contains(*path))
        .cloned()
        .collect();
    deleted_paths.sort();

    set.deleted_paths = deleted_paths;
    set.path_to_id = path_to_id;

    tracing::info!(
        new_files = set.new_files.len(),
        changed_files = set.changed_files.len(),
        unchanged_files = set.unchanged_files.len(),
        deleted_files = set.deleted_paths.len(),
        "Change detection complete"
    );

    set
}
