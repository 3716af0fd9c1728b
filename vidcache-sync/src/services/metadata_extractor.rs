//! Video metadata extraction via ffprobe
//!
//! Extracts:
//! - Duration (whole seconds, only when positive)
//! - File size (ffprobe first, stat as fallback)
//! - Modification time (always from stat)

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Upper bound for one ffprobe invocation
pub const FFPROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata extraction errors
#[derive(Debug, Error)]
pub enum MetadataError {
    /// ffprobe could not be spawned (missing binary, permissions)
    #[error("Failed to execute ffprobe: {0}")]
    Spawn(String),

    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),

    /// ffprobe exited non-zero
    #[error("ffprobe failed: {0}")]
    ToolFailed(String),

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),

    /// I/O error (stat)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracted video metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub file_size: u64,
    /// Whole seconds; `None` when unknown or not positive
    pub duration: Option<u64>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    size: Option<String>,
    duration: Option<String>,
}

/// Modification time truncated to milliseconds
pub fn file_mtime(metadata: &std::fs::Metadata) -> std::io::Result<DateTime<Utc>> {
    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(DateTime::from_timestamp_millis(modified.timestamp_millis()).unwrap_or(modified))
}

/// Parse ffprobe `-print_format json` output into (size, duration)
fn parse_ffprobe_json(raw: &[u8]) -> Result<(Option<u64>, Option<u64>), MetadataError> {
    let output: FfprobeOutput =
        serde_json::from_slice(raw).map_err(|e| MetadataError::Parse(e.to_string()))?;
    let Some(format) = output.format else {
        return Ok((None, None));
    };

    let size = format.size.and_then(|s| s.trim().parse::<u64>().ok());
    let duration = format
        .duration
        .and_then(|d| d.trim().parse::<f64>().ok())
        .map(|d| d.round())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d as u64);

    Ok((size, duration))
}

/// Metadata extractor service
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl MetadataExtractor {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout: FFPROBE_TIMEOUT,
        }
    }

    /// Run ffprobe and merge its figures with a stat of the file
    pub async fn extract(&self, file_path: &Path) -> Result<VideoMetadata, MetadataError> {
        let stat = self.stat_only(file_path).await?;

        let child = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_entries", "format=size,duration"])
            .arg(file_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| MetadataError::Timeout(self.timeout))?
            .map_err(|e| MetadataError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetadataError::ToolFailed(stderr.trim().to_string()));
        }

        let (size, duration) = parse_ffprobe_json(&output.stdout)?;

        Ok(VideoMetadata {
            file_size: size.unwrap_or(stat.file_size),
            duration,
            last_modified: stat.last_modified,
        })
    }

    /// Size and mtime from the filesystem only
    pub async fn stat_only(&self, file_path: &Path) -> Result<VideoMetadata, MetadataError> {
        let metadata = tokio::fs::metadata(file_path).await?;
        Ok(VideoMetadata {
            file_size: metadata.len(),
            duration: None,
            last_modified: file_mtime(&metadata)?,
        })
    }

    /// Extract, degrading to a stat-only result when ffprobe fails
    pub async fn extract_or_stat(&self, file_path: &Path) -> Result<VideoMetadata, MetadataError> {
        match self.extract(file_path).await {
            Ok(metadata) => Ok(metadata),
            Err(MetadataError::Io(e)) => Err(MetadataError::Io(e)),
            Err(e) => {
                tracing::warn!(
                    file = %file_path.display(),
                    error = %e,
                    "Metadata extraction failed, using file stat"
                );
                self.stat_only(file_path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffprobe_json() {
        let raw = br#"{"format": {"size": "1048576", "duration": "1430.52"}}"#;
        let (size, duration) = parse_ffprobe_json(raw).unwrap();
        assert_eq!(size, Some(1_048_576));
        assert_eq!(duration, Some(1431));
    }

    #[test]
    fn test_zero_duration_is_unknown() {
        let raw = br#"{"format": {"duration": "0.000000"}}"#;
        let (size, duration) = parse_ffprobe_json(raw).unwrap();
        assert_eq!(size, None);
        assert_eq!(duration, None);
    }

    #[test]
    fn test_missing_format_section() {
        assert_eq!(parse_ffprobe_json(b"{}").unwrap(), (None, None));
        assert!(parse_ffprobe_json(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_ffprobe_falls_back_to_stat() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![0u8; 42]).unwrap();

        let extractor = MetadataExtractor::new("/nonexistent/ffprobe");
        assert!(matches!(
            extractor.extract(&file).await,
            Err(MetadataError::Spawn(_))
        ));

        let metadata = extractor.extract_or_stat(&file).await.unwrap();
        assert_eq!(metadata.file_size, 42);
        assert_eq!(metadata.duration, None);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let extractor = MetadataExtractor::new("/nonexistent/ffprobe");
        let result = extractor.extract_or_stat(Path::new("/nonexistent/clip.mp4")).await;
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }
}
