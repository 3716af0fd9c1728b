//! Thumbnail generation
//!
//! One WebP per catalog entry at `<thumbnail_dir>/<video_id>.webp`. An
//! existing thumbnail at least as new as the video is reused; a sibling
//! `<stem>.webp` next to the video is copied instead of invoking ffmpeg.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use super::metadata_extractor::file_mtime;

pub const THUMBNAIL_WIDTH: u32 = 320;
pub const THUMBNAIL_QUALITY: u32 = 75;
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Failed to execute ffmpeg: {0}")]
    Spawn(String),

    #[error("ffmpeg timed out")]
    Timeout,

    #[error("ffmpeg failed: {0}")]
    ToolFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seek position as `HH:MM:SS.s`
fn format_seek(seconds: f64) -> String {
    let whole = seconds.max(0.0);
    let hours = (whole / 3600.0).floor() as u64;
    let minutes = ((whole % 3600.0) / 60.0).floor() as u64;
    let secs = whole % 60.0;
    format!("{:02}:{:02}:{:04.1}", hours, minutes, secs)
}

/// One third into the video, never before the first second
fn seek_seconds(duration: Option<u64>) -> f64 {
    duration.map(|d| d as f64 * 0.33).unwrap_or(0.0).max(1.0)
}

#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    ffmpeg_path: PathBuf,
    thumbnail_dir: PathBuf,
}

impl ThumbnailGenerator {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, thumbnail_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            thumbnail_dir: thumbnail_dir.into(),
        }
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    pub fn thumbnail_path(&self, video_id: &str) -> PathBuf {
        self.thumbnail_dir.join(format!("{}.webp", video_id))
    }

    /// Produce (or reuse) the thumbnail for one video
    pub async fn generate(
        &self,
        video_path: &Path,
        video_id: &str,
        duration: Option<u64>,
        video_modified: DateTime<Utc>,
    ) -> Result<PathBuf, ThumbnailError> {
        let output = self.thumbnail_path(video_id);

        if let Ok(existing) = tokio::fs::metadata(&output).await {
            if file_mtime(&existing)? >= video_modified {
                tracing::debug!(thumbnail = %output.display(), "Reusing existing thumbnail");
                return Ok(output);
            }
        }

        tokio::fs::create_dir_all(&self.thumbnail_dir).await?;

        let sibling = video_path.with_extension("webp");
        if tokio::fs::try_exists(&sibling).await.unwrap_or(false) {
            tokio::fs::copy(&sibling, &output).await?;
            tracing::debug!(source = %sibling.display(), "Copied sibling thumbnail");
            return Ok(output);
        }

        let filter = format!("thumbnail,scale={}:-1", THUMBNAIL_WIDTH);
        let quality = THUMBNAIL_QUALITY.to_string();
        let child = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-ss")
            .arg(format_seek(seek_seconds(duration)))
            .arg("-i")
            .arg(video_path)
            .args(["-vf", &filter, "-frames:v", "1", "-f", "webp", "-quality", &quality])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(FFMPEG_TIMEOUT, child)
            .await
            .map_err(|_| ThumbnailError::Timeout)?
            .map_err(|e| ThumbnailError::Spawn(e.to_string()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().last().unwrap_or_default().to_string();
            return Err(ThumbnailError::ToolFailed(tail));
        }

        Ok(output)
    }

    /// [`generate`](Self::generate), logging and discarding failures
    pub async fn generate_or_none(
        &self,
        video_path: &Path,
        video_id: &str,
        duration: Option<u64>,
        video_modified: DateTime<Utc>,
    ) -> Option<PathBuf> {
        match self.generate(video_path, video_id, duration, video_modified).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(file = %video_path.display(), error = %e, "Thumbnail generation failed");
                None
            }
        }
    }

    /// Remove the thumbnail for `video_id`; a missing file is not an error
    pub async fn delete_thumbnail(&self, video_id: &str) -> Result<(), ThumbnailError> {
        remove_if_exists(&self.thumbnail_path(video_id)).await
    }
}

/// Remove a thumbnail file by path; a missing file is not an error
pub async fn remove_if_exists(path: &Path) -> Result<(), ThumbnailError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seek() {
        assert_eq!(format_seek(1.0), "00:00:01.0");
        assert_eq!(format_seek(3725.5), "01:02:05.5");
    }

    #[test]
    fn test_seek_seconds() {
        assert_eq!(seek_seconds(None), 1.0);
        assert_eq!(seek_seconds(Some(2)), 1.0);
        assert!((seek_seconds(Some(600)) - 198.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sibling_webp_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("ep1.mp4");
        std::fs::write(&video, b"video").unwrap();
        std::fs::write(dir.path().join("ep1.webp"), b"thumb").unwrap();

        let generator = ThumbnailGenerator::new("/nonexistent/ffmpeg", dir.path().join("thumbs"));
        let out = generator
            .generate(&video, "abc", Some(60), Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();

        assert_eq!(out, dir.path().join("thumbs/abc.webp"));
        assert_eq!(std::fs::read(&out).unwrap(), b"thumb");
    }

    #[tokio::test]
    async fn test_fresh_thumbnail_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = dir.path().join("thumbs");
        std::fs::create_dir_all(&thumbs).unwrap();
        std::fs::write(thumbs.join("abc.webp"), b"old").unwrap();

        let generator = ThumbnailGenerator::new("/nonexistent/ffmpeg", &thumbs);
        let video_modified = Utc::now() - chrono::Duration::days(1);
        let out = generator
            .generate(Path::new("/nonexistent/ep1.mp4"), "abc", None, video_modified)
            .await
            .unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("ep1.mp4");
        std::fs::write(&video, b"video").unwrap();

        let generator = ThumbnailGenerator::new("/nonexistent/ffmpeg", dir.path().join("thumbs"));
        assert!(generator
            .generate_or_none(&video, "abc", None, Utc::now())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_thumbnail_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ThumbnailGenerator::new("ffmpeg", dir.path());
        std::fs::write(generator.thumbnail_path("abc"), b"x").unwrap();

        generator.delete_thumbnail("abc").await.unwrap();
        assert!(!generator.thumbnail_path("abc").exists());
        generator.delete_thumbnail("abc").await.unwrap();
    }
}
