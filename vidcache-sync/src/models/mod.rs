//! Data models for vidcache-sync
//!
//! - Catalog rows and the records that become them
//! - In-memory scan run state

pub mod catalog;
pub mod scan_run;

pub use catalog::{CandidateFile, CatalogEntry, PlaylistEntry, VideoRecord};
pub use scan_run::{ControlResult, ScanRun, ScanStatus};
