//! Metadata/thumbnail pipeline over new and changed files
//!
//! Unchanged files skip extraction: their catalog values are reused and only
//! the playlist is re-derived from the current directory layout. Changed
//! files that could not be read this time keep their existing rows.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use vidcache_common::settings::ScanSettings;

use super::ScanOrchestrator;
use crate::error::ScanResult;
use crate::models::VideoRecord;
use crate::services::change_detector::ChangeSet;
use crate::services::control_channel::ControlHandle;
use crate::services::metadata_extractor::MetadataExtractor;
use crate::services::pipeline::{select_pipeline, FileProcessor, FileProcessorParts};
use crate::services::playlist_detector::PlaylistAssigner;
use crate::services::scan_reporter::ScanReporter;
use crate::services::thumbnail_generator::ThumbnailGenerator;

/// Records to write plus cataloged paths that produced no record
pub(super) struct MetadataOutput {
    pub records: Vec<VideoRecord>,
    pub unreadable: Vec<String>,
}

impl ScanOrchestrator {
    /// Run the pipeline and combine its output with the unchanged files
    ///
    /// Records come back processed-first, then unchanged.
    pub(super) async fn phase_metadata(
        &self,
        settings: &ScanSettings,
        reporter: &Arc<ScanReporter>,
        control: &ControlHandle,
        changes: ChangeSet,
        assigner: &PlaylistAssigner,
    ) -> ScanResult<MetadataOutput> {
        let files = changes.files_to_process();
        let cataloged: Vec<String> = changes.changed_files.iter().map(|f| f.file_path.clone()).collect();
        let total = files.len();

        let mut records = if files.is_empty() {
            tracing::info!(scan_id = reporter.scan_id(), "No new or changed files");
            Vec::new()
        } else {
            let processor = Arc::new(FileProcessor::new(
                FileProcessorParts {
                    settings: settings.clone(),
                    metadata: MetadataExtractor::new(&self.config.ffprobe_path),
                    thumbnails: ThumbnailGenerator::new(&self.config.ffmpeg_path, &self.config.thumbnail_dir),
                    assigner: assigner.clone(),
                    resources: Arc::clone(&self.resources),
                    reporter: Arc::clone(reporter),
                    control: control.clone(),
                    path_to_id: changes.path_to_id,
                },
                total,
            ));

            let pipeline = select_pipeline(total, settings);
            tracing::info!(
                scan_id = reporter.scan_id(),
                pipeline = pipeline.name(),
                files = total,
                "Metadata pipeline selected"
            );
            pipeline.run(files, processor).await?
        };

        let skipped = total - records.len();
        if skipped > 0 {
            tracing::warn!(scan_id = reporter.scan_id(), skipped, "Files skipped during metadata extraction");
        }

        let produced: HashSet<&str> = records.iter().map(|r| r.file_path.as_str()).collect();
        let unreadable: Vec<String> = cataloged
            .into_iter()
            .filter(|path| !produced.contains(path.as_str()))
            .collect();
        for path in &unreadable {
            tracing::warn!(scan_id = reporter.scan_id(), file = %path, "Keeping catalog entry for unreadable file");
        }

        records.extend(changes.unchanged_files.into_iter().map(|(file, entry)| {
            let playlist_id = assigner.assign(Path::new(&file.file_path), &file.root);
            entry.into_record(playlist_id)
        }));

        Ok(MetadataOutput { records, unreadable })
    }
}
