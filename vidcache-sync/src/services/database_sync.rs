//! Catalog synchronization
//!
//! 1. Delete rows whose paths are absent from this run (own transaction)
//! 2. Remove thumbnails of those rows as soon as the delete has committed
//! 3. Upsert survivors in `batch_size` batches, one transaction each
//!
//! Earlier batches stay committed when a later one fails. Retained paths
//! (files that were discovered but could not be read) keep their rows.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;

use super::control_channel::ControlHandle;
use super::scan_reporter::ScanReporter;
use super::thumbnail_generator::{remove_if_exists, ThumbnailGenerator};
use crate::db::playlists::reconcile_membership;
use crate::db::videos::{delete_by_paths, load_all_paths, upsert_video, DeletedVideo};
use crate::error::{ScanError, ScanResult};
use crate::models::VideoRecord;
use crate::utils::db_retry::DEFAULT_MAX_LOCK_WAIT_MS;
use crate::utils::{begin_monitored, retry_on_lock};
use vidcache_common::Result;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub upserted: usize,
    pub deleted: usize,
    pub thumbnails_removed: usize,
    pub batches: usize,
}

/// Delete every catalog row whose path is not in `present`
async fn delete_absent(pool: &SqlitePool, present: &HashSet<&str>) -> Result<Vec<DeletedVideo>> {
    let mut tx = begin_monitored(pool, "catalog_delete").await?;
    let absent: Vec<String> = load_all_paths(tx.conn()?)
        .await?
        .into_iter()
        .filter(|path| !present.contains(path.as_str()))
        .collect();

    if absent.is_empty() {
        tx.rollback().await?;
        return Ok(Vec::new());
    }

    let deleted = delete_by_paths(tx.conn()?, &absent).await?;
    tx.commit().await?;
    Ok(deleted)
}

async fn write_batch(pool: &SqlitePool, batch: &[VideoRecord]) -> Result<()> {
    let scanned_at = Utc::now();
    let mut tx = begin_monitored(pool, "catalog_batch").await?;
    for record in batch {
        let id = upsert_video(tx.conn()?, record, scanned_at).await?;
        reconcile_membership(tx.conn()?, &id, record.playlist_id.as_deref()).await?;
    }
    tx.commit().await
}

pub struct DatabaseSync<'a> {
    pool: &'a SqlitePool,
    thumbnails: &'a ThumbnailGenerator,
    reporter: &'a ScanReporter,
    batch_size: usize,
    retained: HashSet<String>,
}

impl<'a> DatabaseSync<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        thumbnails: &'a ThumbnailGenerator,
        reporter: &'a ScanReporter,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            thumbnails,
            reporter,
            batch_size: batch_size.max(1),
            retained: HashSet::new(),
        }
    }

    /// Keep the rows of `paths` even though no record carries them
    pub fn retain_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.retained.extend(paths);
        self
    }

    /// Bring the catalog in line with `records`
    ///
    /// Progress is reported in the 50-100% band. A cancellation observed
    /// between batches stops further writes.
    pub async fn run(&self, records: &[VideoRecord], control: &mut ControlHandle) -> ScanResult<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        let total = records.len();

        control.check().await?;
        let present: HashSet<&str> = records
            .iter()
            .map(|r| r.file_path.as_str())
            .chain(self.retained.iter().map(String::as_str))
            .collect();
        let deleted = retry_on_lock("catalog delete", DEFAULT_MAX_LOCK_WAIT_MS, || {
            delete_absent(self.pool, &present)
        })
        .await?;
        outcome.deleted = deleted.len();
        if !deleted.is_empty() {
            tracing::info!(deleted = deleted.len(), "Removed catalog entries for missing files");
        }
        // Thumbnails follow the committed delete, whatever the batches do
        outcome.thumbnails_removed = self.remove_thumbnails(&deleted).await;

        let mut done = 0;
        for batch in records.chunks(self.batch_size) {
            if control.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            control.check().await?;

            retry_on_lock("catalog batch", DEFAULT_MAX_LOCK_WAIT_MS, || write_batch(self.pool, batch)).await?;

            done += batch.len();
            outcome.batches += 1;
            outcome.upserted = done;

            let percent = 50 + (done * 50 / total.max(1)).min(50) as u8;
            self.reporter.progress(
                percent,
                done,
                total,
                None,
                format!("Updating catalog {}/{}", done, total),
            );
        }

        Ok(outcome)
    }

    async fn remove_thumbnails(&self, deleted: &[DeletedVideo]) -> usize {
        let mut removed = 0;
        for video in deleted {
            let path = video
                .thumbnail_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.thumbnails.thumbnail_path(&video.video_id));
            match remove_if_exists(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(thumbnail = %path.display(), error = %e, "Failed to remove thumbnail");
                }
            }
        }
        removed
    }
}
