//! Discovery, playlist sync and change detection
//!
//! Roots are walked concurrently on the blocking pool. A missing or
//! unreadable root is logged and skipped; the scan carries on with the rest.

use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant;

use vidcache_common::events::SkipStats;

use super::ScanOrchestrator;
use crate::db;
use crate::error::{ScanError, ScanResult};
use crate::models::CandidateFile;
use crate::services::change_detector::{detect_changes, ChangeSet};
use crate::services::control_channel::ControlHandle;
use crate::services::file_scanner::FileScanner;
use crate::services::playlist_detector::{detect_playlists, PlaylistAssigner};
use crate::services::scan_reporter::ScanReporter;

/// Keep the first occurrence of every path (roots may overlap)
fn dedupe_candidates(candidates: Vec<CandidateFile>) -> Vec<CandidateFile> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.file_path.clone()))
        .collect()
}

impl ScanOrchestrator {
    /// Walk every configured root in parallel
    pub(super) async fn phase_discovery(
        &self,
        scan_id: &str,
        control: &mut ControlHandle,
    ) -> ScanResult<Vec<CandidateFile>> {
        let started = Instant::now();

        let walks = self.config.video_roots.iter().cloned().map(|root| {
            tokio::task::spawn_blocking(move || {
                let result = FileScanner::new().scan(&root);
                (root, result)
            })
        });

        let mut candidates = Vec::new();
        for joined in join_all(walks).await {
            let (root, result) =
                joined.map_err(|e| ScanError::Internal(format!("Discovery task failed: {}", e)))?;
            match result {
                Ok(files) => {
                    tracing::info!(scan_id, root = %root.display(), files_found = files.len(), "Root scanned");
                    candidates.extend(files);
                }
                Err(e) => {
                    tracing::warn!(scan_id, root = %root.display(), error = %e, "Skipping video root");
                }
            }
        }
        control.check().await?;

        let candidates = dedupe_candidates(candidates);
        tracing::info!(
            scan_id,
            files_found = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery complete"
        );
        Ok(candidates)
    }

    /// Detect directory playlists and sync the playlist table
    pub(super) async fn phase_playlists(&self, scan_id: &str) -> ScanResult<PlaylistAssigner> {
        let roots = self.config.video_roots.clone();
        let playlists = tokio::task::spawn_blocking(move || detect_playlists(&roots))
            .await
            .map_err(|e| ScanError::Internal(format!("Playlist detection task failed: {}", e)))?;

        let deactivated = db::playlists::sync_playlists(&self.db, &playlists).await?;
        tracing::info!(scan_id, playlists = playlists.len(), deactivated, "Playlists synchronized");

        Ok(PlaylistAssigner::new(&playlists))
    }

    /// Classify candidates against the catalog and announce the breakdown
    pub(super) async fn phase_changes(
        &self,
        scan_id: &str,
        reporter: &ScanReporter,
        candidates: Vec<CandidateFile>,
    ) -> ScanResult<ChangeSet> {
        let catalog = db::videos::load_all_videos(&self.db).await?;
        let changes = tokio::task::spawn_blocking(move || detect_changes(candidates, catalog))
            .await
            .map_err(|e| ScanError::Internal(format!("Change detection task failed: {}", e)))?;

        let stats = SkipStats::new(
            changes.new_files.len(),
            changes.changed_files.len(),
            changes.unchanged_files.len(),
            changes.deleted_paths.len(),
        );
        tracing::info!(
            scan_id,
            unchanged_percentage = stats.unchanged_percentage,
            "Skipping unchanged files"
        );
        reporter.scan_stats(stats);

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidate(path: &str, root: &str) -> CandidateFile {
        CandidateFile {
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            root: PathBuf::from(root),
        }
    }

    #[test]
    fn test_overlapping_roots_yield_each_path_once() {
        let deduped = dedupe_candidates(vec![
            candidate("/v/a.mp4", "/v"),
            candidate("/v/b.mp4", "/v"),
            candidate("/v/a.mp4", "/v"),
        ]);
        let paths: Vec<&str> = deduped.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/v/a.mp4", "/v/b.mp4"]);
    }
}
