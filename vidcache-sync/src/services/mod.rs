//! Service modules for catalog synchronization

pub mod change_detector;
pub mod control_channel;
pub mod database_sync;
pub mod deduplicator;
pub mod file_scanner;
pub mod filename_parser;
pub mod metadata_extractor;
pub mod pipeline;
pub mod playlist_detector;
pub mod progress_calculator;
pub mod resource_monitor;
pub mod scan_orchestrator;
pub mod scan_reporter;
pub mod scheduler;
pub mod thumbnail_generator;

pub use change_detector::{detect_changes, ChangeSet};
pub use control_channel::{ControlChannel, ControlHandle, ControlState};
pub use database_sync::{DatabaseSync, SyncOutcome};
pub use deduplicator::{deduplicate, Deduplicated};
pub use file_scanner::{DiscoveryError, FileScanner};
pub use filename_parser::{parse_file_name, ParsedFileName};
pub use metadata_extractor::{MetadataError, MetadataExtractor, VideoMetadata};
pub use pipeline::{select_pipeline, ChunkedPipeline, ScanPipeline, StreamingPipeline};
pub use playlist_detector::{detect_playlists, PlaylistAssigner};
pub use progress_calculator::{ProgressCalculator, ProgressMetrics};
pub use resource_monitor::{ResourceCheck, ResourceMonitor, ResourceSnapshot};
pub use scan_orchestrator::{OrchestratorConfig, ScanOrchestrator, ScanOutcome};
pub use scan_reporter::ScanReporter;
pub use scheduler::{ExecutionStatus, ScanScheduler, SchedulerStatus};
pub use thumbnail_generator::{ThumbnailError, ThumbnailGenerator};
