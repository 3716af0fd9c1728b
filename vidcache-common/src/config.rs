//! Configuration loading and root folder resolution

use crate::settings::{ScanSettings, ScheduleSettings};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: Option<String>,
}

/// Contents of `config.toml`
///
/// Every field is optional; missing keys fall back to CLI/ENV values or
/// compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<String>,
    #[serde(default)]
    pub video_directories: Vec<String>,
    pub ffprobe_path: Option<String>,
    pub ffmpeg_path: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Mirror of the database scan settings (backup only)
    pub scan: Option<ScanSettings>,
    /// Mirror of the database schedule settings (backup only)
    pub schedule: Option<ScheduleSettings>,
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root_folder) = &toml_config.root_folder {
        return PathBuf::from(root_folder);
    }

    default_root_folder()
}

/// Split a comma-separated list of video roots
///
/// Surrounding whitespace and quotes are stripped; empty entries dropped.
pub fn parse_video_directories(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Default location of the user config file (`~/.config/vidcache/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vidcache").join("config.toml"))
}

/// Load the TOML config, returning defaults when the file does not exist
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write the TOML config via a temp file + rename
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("vidcache"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vidcache"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vidcache"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vidcache"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vidcache"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vidcache"))
    } else {
        PathBuf::from("./vidcache_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_video_directories_strips_quotes() {
        let dirs = parse_video_directories(r#" "/mnt/a" , '/mnt/b',, /mnt/c "#);
        assert_eq!(
            dirs,
            vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b"), PathBuf::from("/mnt/c")]
        );
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env() {
        std::env::set_var("VIDCACHE_TEST_ROOT", "/from/env");
        let cfg = TomlConfig::default();
        let root = resolve_root_folder(Some(Path::new("/from/cli")), "VIDCACHE_TEST_ROOT", &cfg);
        assert_eq!(root, PathBuf::from("/from/cli"));
        std::env::remove_var("VIDCACHE_TEST_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        std::env::set_var("VIDCACHE_TEST_ROOT", "/from/env");
        let cfg = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let root = resolve_root_folder(None, "VIDCACHE_TEST_ROOT", &cfg);
        assert_eq!(root, PathBuf::from("/from/env"));
        std::env::remove_var("VIDCACHE_TEST_ROOT");

        let root = resolve_root_folder(None, "VIDCACHE_TEST_ROOT", &cfg);
        assert_eq!(root, PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_toml_round_trip_keeps_scan_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = TomlConfig::default();
        config.video_directories = vec!["/videos".to_string()];
        config.scan = Some(ScanSettings {
            batch_size: 25,
            ..Default::default()
        });
        write_toml_config(&config, &path).unwrap();

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded.video_directories, vec!["/videos".to_string()]);
        assert_eq!(loaded.scan.map(|s| s.batch_size), Some(25));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_toml_config(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.root_folder.is_none());
    }
}
