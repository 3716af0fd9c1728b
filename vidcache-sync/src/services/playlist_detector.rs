//! Directory-derived playlists
//!
//! Every immediate subdirectory of a configured root that contains at least
//! one video file (within 10 levels) is a playlist. Playlist ids are a hash of
//! the relative path, so detection is idempotent.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path};

use super::file_scanner::FileScanner;
use crate::models::PlaylistEntry;

const PLAYLIST_MAX_DEPTH: usize = 10;

/// Deterministic playlist id for a root-relative directory path
pub fn playlist_id(relative_path: &str) -> String {
    format!("{:x}", Sha256::digest(format!("playlist:{}", relative_path).as_bytes()))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Detect playlists under every root; unreadable roots are skipped
pub fn detect_playlists(roots: &[impl AsRef<Path>]) -> Vec<PlaylistEntry> {
    let scanner = FileScanner::new().with_max_depth(PLAYLIST_MAX_DEPTH);
    let mut playlists: Vec<PlaylistEntry> = Vec::new();

    for root in roots {
        let root = root.as_ref();
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Playlist detection skipped root");
                continue;
            }
        };

        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .collect();
        dirs.sort_by_key(|e| e.file_name());

        for entry in dirs {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_hidden(&name) || !scanner.contains_video(&entry.path()) {
                continue;
            }

            let id = playlist_id(&name);
            if playlists.iter().any(|p| p.id == id) {
                // Same directory name under two roots maps to one playlist
                continue;
            }

            playlists.push(PlaylistEntry {
                id,
                name: name.clone(),
                path: name,
                root_path: root.to_string_lossy().to_string(),
                is_active: true,
            });
        }
    }

    tracing::debug!(playlists = playlists.len(), "Playlist detection complete");
    playlists
}

/// Maps files to detected playlists by their first-level directory
#[derive(Debug, Clone, Default)]
pub struct PlaylistAssigner {
    by_path: HashMap<String, String>,
}

impl PlaylistAssigner {
    pub fn new(playlists: &[PlaylistEntry]) -> Self {
        Self {
            by_path: playlists
                .iter()
                .map(|p| (p.path.clone(), p.id.clone()))
                .collect(),
        }
    }

    /// Playlist id for `file_path` under `root`
    ///
    /// Files directly in the root, or outside it, get no playlist.
    pub fn assign(&self, file_path: &Path, root: &Path) -> Option<String> {
        let relative = file_path.strip_prefix(root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        if parts.len() <= 1 {
            return None;
        }
        self.by_path.get(parts[0]).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_playlist_id_is_deterministic() {
        assert_eq!(playlist_id("anime"), playlist_id("anime"));
        assert_ne!(playlist_id("anime"), playlist_id("drama"));
        assert_eq!(playlist_id("anime").len(), 64);
    }

    #[test]
    fn test_detect_skips_hidden_and_empty_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("anime/s1")).unwrap();
        fs::create_dir_all(root.join("_trash")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("anime/s1/ep1.mp4"), b"x").unwrap();
        fs::write(root.join("_trash/old.mp4"), b"x").unwrap();
        fs::write(root.join(".cache/c.mp4"), b"x").unwrap();
        fs::write(root.join("docs/readme.txt"), b"x").unwrap();
        fs::write(root.join("loose.mp4"), b"x").unwrap();

        let playlists = detect_playlists(&[root]);
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "anime");
        assert_eq!(playlists[0].id, playlist_id("anime"));
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let playlists = detect_playlists(&[Path::new("/nonexistent/vidcache")]);
        assert!(playlists.is_empty());
    }

    #[test]
    fn test_assign_uses_first_level_directory() {
        let playlists = vec![PlaylistEntry {
            id: playlist_id("anime"),
            name: "anime".to_string(),
            path: "anime".to_string(),
            root_path: "/videos".to_string(),
            is_active: true,
        }];
        let assigner = PlaylistAssigner::new(&playlists);
        let root = Path::new("/videos");

        assert_eq!(
            assigner.assign(Path::new("/videos/anime/s1/ep1.mp4"), root),
            Some(playlist_id("anime"))
        );
        assert_eq!(assigner.assign(Path::new("/videos/loose.mp4"), root), None);
        assert_eq!(assigner.assign(Path::new("/videos/drama/x.mp4"), root), None);
        assert_eq!(assigner.assign(Path::new("/elsewhere/anime/x.mp4"), root), None);
    }
}
