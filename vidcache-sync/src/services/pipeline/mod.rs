//! Metadata/thumbnail pipeline
//!
//! Two strategies share one per-file contract ([`FileProcessor`]):
//! - [`StreamingPipeline`] for very large change sets (bounded buffering)
//! - [`ChunkedPipeline`] otherwise (N contiguous chunks, one task each)
//!
//! The orchestrator picks one with [`select_pipeline`].

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use vidcache_common::settings::ScanSettings;

use super::control_channel::ControlHandle;
use super::filename_parser::parse_file_name;
use super::metadata_extractor::MetadataExtractor;
use super::playlist_detector::PlaylistAssigner;
use super::resource_monitor::ResourceMonitor;
use super::scan_reporter::ScanReporter;
use super::thumbnail_generator::ThumbnailGenerator;
use crate::error::ScanResult;
use crate::models::{CandidateFile, VideoRecord};

mod chunked;
mod streaming;

pub use chunked::ChunkedPipeline;
pub use streaming::StreamingPipeline;

/// Change sets at least this large are streamed
pub const STREAM_PROCESSING_THRESHOLD: usize = 1000;

/// Longest a single file waits on the CPU/time-window gate
pub const AUTO_PAUSE_MAX_WAIT: Duration = Duration::from_secs(5);

/// Pipeline strategy
#[async_trait]
pub trait ScanPipeline: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process every file, returning records in input order
    ///
    /// Files that cannot be read are dropped; cancellation aborts the run.
    async fn run(
        &self,
        files: Vec<CandidateFile>,
        processor: Arc<FileProcessor>,
    ) -> ScanResult<Vec<VideoRecord>>;
}

pub fn select_pipeline(file_count: usize, settings: &ScanSettings) -> Box<dyn ScanPipeline> {
    let concurrency = settings.max_concurrent_operations.max(1);
    if file_count >= STREAM_PROCESSING_THRESHOLD {
        Box::new(StreamingPipeline::new(concurrency))
    } else {
        Box::new(ChunkedPipeline::new(concurrency))
    }
}

/// Thumbnail key for a catalog path
pub fn video_id_for(file_path: &str) -> String {
    format!("{:x}", Sha256::digest(file_path.as_bytes()))
}

/// Collaborators of the per-file step
pub struct FileProcessorParts {
    pub settings: ScanSettings,
    pub metadata: MetadataExtractor,
    pub thumbnails: ThumbnailGenerator,
    pub assigner: PlaylistAssigner,
    pub resources: Arc<ResourceMonitor>,
    pub reporter: Arc<ScanReporter>,
    pub control: ControlHandle,
    /// Known catalog ids, reused for changed files
    pub path_to_id: HashMap<String, String>,
}

/// Shared per-file step
pub struct FileProcessor {
    parts: FileProcessorParts,
    total: usize,
    processed: Mutex<usize>,
}

impl FileProcessor {
    pub fn new(parts: FileProcessorParts, total: usize) -> Self {
        Self {
            parts,
            total,
            processed: Mutex::new(0),
        }
    }

    /// Fresh control handle for one worker
    pub fn control(&self) -> ControlHandle {
        self.parts.control.clone()
    }

    pub fn processed(&self) -> usize {
        *self.processed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every per-file step for `file`
    ///
    /// `Ok(None)` means the file could not be read and was skipped.
    pub async fn process(
        &self,
        control: &mut ControlHandle,
        file: CandidateFile,
    ) -> ScanResult<Option<VideoRecord>> {
        control.check().await?;
        self.auto_pause_gate(control).await?;

        let record = self.build_record(&file).await;
        self.record_progress(&file.file_path);

        if self.parts.resources.memory_exceeded(&self.parts.settings) {
            let pause = Duration::from_millis(self.parts.settings.sleep_interval * 2);
            tracing::debug!(pause_ms = pause.as_millis() as u64, "Memory threshold exceeded, throttling");
            tokio::time::sleep(pause).await;
        }

        Ok(record)
    }

    async fn build_record(&self, file: &CandidateFile) -> Option<VideoRecord> {
        let started = Instant::now();
        let path = Path::new(&file.file_path);

        let metadata = match self.parts.metadata.extract_or_stat(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(file = %file.file_path, error = %e, "Skipping unreadable file");
                return None;
            }
        };

        let video_id = video_id_for(&file.file_path);
        let thumbnail_path = self
            .parts
            .thumbnails
            .generate_or_none(path, &video_id, metadata.duration, metadata.last_modified)
            .await
            .map(|p| p.to_string_lossy().to_string());

        let parsed = parse_file_name(&file.file_name);
        let playlist_id = self.parts.assigner.assign(path, &file.root);
        let id = self
            .parts
            .path_to_id
            .get(&file.file_path)
            .cloned()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.parts.settings.enable_detailed_logging {
            tracing::debug!(
                file = %file.file_path,
                duration = ?metadata.duration,
                thumbnail = thumbnail_path.is_some(),
                playlist = ?playlist_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "File processed"
            );
        }

        Some(VideoRecord {
            id,
            file_path: file.file_path.clone(),
            file_name: file.file_name.clone(),
            title: parsed.title,
            file_size: metadata.file_size as i64,
            duration: metadata.duration.map(|d| d as i64),
            episode: parsed.episode,
            year: parsed.year,
            video_id,
            thumbnail_path,
            last_modified: metadata.last_modified,
            playlist_id,
            metadata_extracted_at: metadata.duration.map(|_| Utc::now()),
        })
    }

    /// Count a finished file and emit progress on the configured cadence
    fn record_progress(&self, current_file: &str) {
        let mut processed = self.processed.lock().unwrap_or_else(PoisonError::into_inner);
        *processed += 1;
        let done = *processed;

        let interval = self.parts.settings.progress_update_interval.max(1);
        if done % interval == 0 || done == self.total {
            let percent = if self.total > 0 {
                (done * 50 / self.total).min(50) as u8
            } else {
                50
            };
            // Emitted under the counter lock so subscribers see counts in order
            self.parts.reporter.progress(
                percent,
                done,
                self.total,
                Some(current_file.to_string()),
                format!("Extracting metadata {}/{}", done, self.total),
            );
        }
    }

    /// Wait while CPU auto-pause or the time window applies, up to the cap
    async fn auto_pause_gate(&self, control: &mut ControlHandle) -> ScanResult<()> {
        let settings = &self.parts.settings;
        if !settings.auto_pause_on_high_cpu && !settings.auto_pause_time_range.enabled {
            return Ok(());
        }

        let deadline = Instant::now() + AUTO_PAUSE_MAX_WAIT;
        let recheck = Duration::from_millis(settings.sleep_interval.max(1));
        let mut logged = false;

        loop {
            let check = self.parts.resources.check_system_resources(settings);
            let in_window = settings
                .auto_pause_time_range
                .contains_hour(chrono::Local::now().hour());
            if (check.cpu_ok && !in_window) || Instant::now() >= deadline {
                return Ok(());
            }
            if !logged {
                tracing::debug!(reason = ?check.message, "Auto-pause gate holding worker");
                logged = true;
            }
            control.wait_change(recheck).await?;
            control.check().await?;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::services::control_channel::ControlChannel;
    use crate::services::scan_reporter::SharedRun;
    use vidcache_common::events::EventBus;

    /// Processor wired to nonexistent tools, so extraction falls back to stat
    pub fn processor(
        channel: &ControlChannel,
        bus: EventBus,
        thumbnail_dir: &Path,
        total: usize,
    ) -> Arc<FileProcessor> {
        let run: SharedRun = Arc::new(Mutex::new(None));
        let reporter = Arc::new(ScanReporter::new(channel.scan_id(), bus, run));
        Arc::new(FileProcessor::new(
            FileProcessorParts {
                settings: ScanSettings {
                    progress_update_interval: 10,
                    ..Default::default()
                },
                metadata: MetadataExtractor::new("/nonexistent/ffprobe"),
                thumbnails: ThumbnailGenerator::new("/nonexistent/ffmpeg", thumbnail_dir),
                assigner: PlaylistAssigner::default(),
                resources: Arc::new(ResourceMonitor::new()),
                reporter,
                control: channel.handle(),
                path_to_id: HashMap::new(),
            },
            total,
        ))
    }

    pub fn candidates(dir: &Path, count: usize) -> Vec<CandidateFile> {
        (0..count)
            .map(|i| {
                let name = format!("video_{:03}.mp4", i);
                let path = dir.join(&name);
                std::fs::write(&path, vec![0u8; i + 1]).unwrap();
                CandidateFile {
                    file_path: crate::services::file_scanner::normalize_path(&path),
                    file_name: name,
                    root: dir.to_path_buf(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::control_channel::ControlChannel;
    use vidcache_common::events::{EventBus, ScanEvent};

    #[test]
    fn test_select_pipeline_by_threshold() {
        let settings = ScanSettings::default();
        assert_eq!(select_pipeline(10, &settings).name(), "chunked");
        assert_eq!(select_pipeline(STREAM_PROCESSING_THRESHOLD, &settings).name(), "streaming");
    }

    #[test]
    fn test_video_id_is_sha256_of_path() {
        let id = video_id_for("/videos/a.mp4");
        assert_eq!(id.len(), 64);
        assert_eq!(id, video_id_for("/videos/a.mp4"));
        assert_ne!(id, video_id_for("/videos/b.mp4"));
    }

    #[tokio::test]
    async fn test_process_falls_back_to_stat() {
        let dir = tempfile::tempdir().unwrap();
        let files = test_support::candidates(dir.path(), 1);
        let channel = ControlChannel::new("scan_1");
        let processor = test_support::processor(&channel, EventBus::new(16), &dir.path().join("thumbs"), 1);

        let mut control = processor.control();
        let record = processor
            .process(&mut control, files[0].clone())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.file_size, 1);
        assert_eq!(record.duration, None);
        assert_eq!(record.metadata_extracted_at, None);
        assert_eq!(record.thumbnail_path, None);
        assert_eq!(record.title, "video_000");
        assert_eq!(processor.processed(), 1);
    }

    #[tokio::test]
    async fn test_last_file_always_reports_half_way() {
        let dir = tempfile::tempdir().unwrap();
        let files = test_support::candidates(dir.path(), 3);
        let bus = EventBus::new(16);
        let channel = ControlChannel::new("scan_1");
        let processor = test_support::processor(&channel, bus.clone(), &dir.path().join("thumbs"), 3);

        let mut control = processor.control();
        for file in files {
            processor.process(&mut control, file).await.unwrap();
        }

        match bus.last_event() {
            Some(ScanEvent::Progress(snapshot)) => {
                assert_eq!(snapshot.progress, 50);
                assert_eq!(snapshot.processed_files, 3);
            }
            other => panic!("expected progress event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_scan_processes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = test_support::candidates(dir.path(), 1);
        let channel = ControlChannel::new("scan_1");
        let processor = test_support::processor(&channel, EventBus::new(16), dir.path(), 1);
        channel.cancel();

        let mut control = processor.control();
        let result = processor.process(&mut control, files[0].clone()).await;
        assert!(matches!(result, Err(crate::error::ScanError::Cancelled)));
        assert_eq!(processor.processed(), 0);
    }
}
