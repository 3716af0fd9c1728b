//! Deduplicate and write the combined record set

use std::sync::Arc;

use vidcache_common::settings::ScanSettings;

use super::ScanOrchestrator;
use crate::error::ScanResult;
use crate::models::VideoRecord;
use crate::services::control_channel::ControlHandle;
use crate::services::database_sync::{DatabaseSync, SyncOutcome};
use crate::services::deduplicator::deduplicate;
use crate::services::scan_reporter::ScanReporter;
use crate::services::thumbnail_generator::ThumbnailGenerator;

impl ScanOrchestrator {
    pub(super) async fn phase_database(
        &self,
        settings: &ScanSettings,
        reporter: &Arc<ScanReporter>,
        control: &mut ControlHandle,
        records: Vec<VideoRecord>,
        retained: Vec<String>,
    ) -> ScanResult<SyncOutcome> {
        let deduplicated = deduplicate(records);
        if !deduplicated.discarded.is_empty() {
            tracing::warn!(
                scan_id = reporter.scan_id(),
                discarded = deduplicated.discarded.len(),
                "Duplicate paths resolved by modification time"
            );
        }

        let batch_size = self.resources.calculate_optimal_batch_size(settings);
        let thumbnails = ThumbnailGenerator::new(&self.config.ffmpeg_path, &self.config.thumbnail_dir);
        let outcome = DatabaseSync::new(&self.db, &thumbnails, reporter, batch_size)
            .retain_paths(retained)
            .run(&deduplicated.records, control)
            .await?;

        tracing::info!(
            scan_id = reporter.scan_id(),
            upserted = outcome.upserted,
            deleted = outcome.deleted,
            thumbnails_removed = outcome.thumbnails_removed,
            batches = outcome.batches,
            batch_size,
            "Catalog synchronized"
        );
        Ok(outcome)
    }
}
