//! Catalog data model
//!
//! `CatalogEntry` mirrors a `videos` row. `VideoRecord` is what the pipeline
//! produces and database sync consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File discovered under a configured root (never persisted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute, normalized path; the catalog's unique key
    pub file_path: String,
    pub file_name: String,
    /// Configured root this file was found under
    pub root: PathBuf,
}

/// One persisted catalog row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogEntry {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub title: String,
    pub file_size: i64,
    pub duration: Option<i64>,
    pub episode: Option<i64>,
    pub year: Option<i64>,
    pub video_id: String,
    pub thumbnail_path: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
    pub metadata_extracted_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Reuse the stored values for an unchanged file, re-tagging its playlist
    pub fn into_record(self, playlist_id: Option<String>) -> VideoRecord {
        VideoRecord {
            id: self.id,
            file_path: self.file_path,
            file_name: self.file_name,
            title: self.title,
            file_size: self.file_size,
            duration: self.duration,
            episode: self.episode,
            year: self.year,
            video_id: self.video_id,
            thumbnail_path: self.thumbnail_path,
            last_modified: self.last_modified,
            playlist_id,
            metadata_extracted_at: self.metadata_extracted_at,
        }
    }
}

/// Catalog-ready record produced by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Existing row id for known paths, fresh UUID otherwise
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub title: String,
    pub file_size: i64,
    pub duration: Option<i64>,
    pub episode: Option<i64>,
    pub year: Option<i64>,
    /// sha256 of the file path, used for thumbnail naming
    pub video_id: String,
    pub thumbnail_path: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub playlist_id: Option<String>,
    /// Set only when a duration was extracted
    pub metadata_extracted_at: Option<DateTime<Utc>>,
}

/// Directory-derived playlist row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistEntry {
    /// sha256 of `playlist:<relative path>`
    pub id: String,
    pub name: String,
    /// Path relative to its root (unique)
    pub path: String,
    pub root_path: String,
    pub is_active: bool,
}
