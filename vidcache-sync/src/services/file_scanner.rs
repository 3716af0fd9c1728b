//! Video file discovery
//!
//! Recursive traversal of one configured root. Symlinks are not followed and
//! symlink loops are detected; unreadable entries are logged and skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::models::CandidateFile;

/// Extensions recognized as video files (lowercase, without dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v"];

/// Discovery errors for a single root
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Empty or whitespace-only root entry
    #[error("Invalid directory path: {0:?}")]
    InvalidRoot(String),
}

/// Whether the file name carries a video extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Catalog key for a path: forward slashes, no trailing separator
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.len() > 1 {
        raw.trim_end_matches('/').to_string()
    } else {
        raw
    }
}

/// Video file scanner
pub struct FileScanner {
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
}

impl FileScanner {
    /// Create new file scanner with default ignore patterns
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "@eaDir".to_string(),
            ],
            max_depth: None,
        }
    }

    /// Limit traversal depth below the root
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Scan one root for video files
    pub fn scan(&self, root_path: &Path) -> Result<Vec<CandidateFile>, DiscoveryError> {
        if root_path.as_os_str().is_empty() || root_path.to_string_lossy().trim().is_empty() {
            return Err(DiscoveryError::InvalidRoot(root_path.to_string_lossy().to_string()));
        }

        if !root_path.exists() {
            return Err(DiscoveryError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(DiscoveryError::NotADirectory(root_path.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_video_file(entry.path()) {
                        files.push(CandidateFile {
                            file_path: normalize_path(entry.path()),
                            file_name: entry.file_name().to_string_lossy().to_string(),
                            root: root_path.to_path_buf(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(root = %root_path.display(), "Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!(
            root = %root_path.display(),
            files_found = files.len(),
            "Directory traversal complete"
        );

        Ok(files)
    }

    /// Whether a directory tree contains at least one video file
    pub fn contains_video(&self, dir: &Path) -> bool {
        let mut symlink_visited = HashSet::new();
        WalkDir::new(dir)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited))
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file() && is_video_file(e.path()))
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        for pattern in &self.ignore_patterns {
            if file_name == pattern.as_str() {
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
