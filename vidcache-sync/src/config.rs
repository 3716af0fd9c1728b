//! Settings resolution and TOML mirroring
//!
//! The database is authoritative. On first start, settings found in the TOML
//! file are migrated into the database; afterwards every change made through
//! the HTTP surface is mirrored back to TOML on a best-effort basis.

use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use vidcache_common::config::{load_toml_config, write_toml_config, TomlConfig};
use vidcache_common::settings::{ScanSettings, ScheduleSettings};

use crate::db;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Common(#[from] vidcache_common::Error),

    #[error("Settings file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Scan settings at startup: database → TOML (migrated) → defaults
///
/// Out-of-range TOML values are ignored with a warning.
pub async fn resolve_scan_settings(db: &Pool<Sqlite>, toml: &TomlConfig) -> Result<ScanSettings, SettingsError> {
    if let Some(settings) = db::settings::load_stored_scan_settings(db).await? {
        info!("Scan settings loaded from database");
        return Ok(settings);
    }

    match &toml.scan {
        Some(settings) => match settings.validate() {
            Ok(()) => {
                db::settings::save_scan_settings(db, settings).await?;
                info!("Scan settings migrated from TOML to database");
                Ok(settings.clone())
            }
            Err(e) => {
                warn!("Ignoring scan settings from TOML: {}", e);
                Ok(ScanSettings::default())
            }
        },
        None => Ok(ScanSettings::default()),
    }
}

/// Schedule settings at startup: database → TOML (migrated) → defaults
pub async fn resolve_schedule_settings(
    db: &Pool<Sqlite>,
    toml: &TomlConfig,
) -> Result<ScheduleSettings, SettingsError> {
    if let Some(settings) = db::settings::load_stored_schedule_settings(db).await? {
        return Ok(settings);
    }

    match &toml.schedule {
        Some(settings) if settings.validate().is_ok() => {
            db::settings::save_schedule_settings(db, settings).await?;
            info!("Schedule settings migrated from TOML to database");
            Ok(settings.clone())
        }
        Some(_) => {
            warn!("Ignoring invalid schedule settings from TOML");
            Ok(ScheduleSettings::default())
        }
        None => Ok(ScheduleSettings::default()),
    }
}

/// Changes to mirror into the TOML file
#[derive(Debug, Default)]
pub struct TomlMirror {
    pub scan: Option<ScanSettings>,
    pub schedule: Option<ScheduleSettings>,
}

/// Write settings into the TOML file, keeping its other keys
pub async fn sync_settings_to_toml(mirror: TomlMirror, toml_path: &Path) -> Result<(), SettingsError> {
    let path: PathBuf = toml_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut config = load_toml_config(&path)?;
        if let Some(scan) = mirror.scan {
            config.scan = Some(scan);
        }
        if let Some(schedule) = mirror.schedule {
            config.schedule = Some(schedule);
        }
        write_toml_config(&config, &path)
    })
    .await??;
    Ok(())
}

/// Mirror to TOML, logging instead of failing
pub async fn mirror_best_effort(mirror: TomlMirror, toml_path: Option<&Path>) {
    let Some(path) = toml_path else {
        return;
    };
    match sync_settings_to_toml(mirror, path).await {
        Ok(()) => info!("Settings synced to TOML: {}", path.display()),
        Err(e) => warn!("TOML sync failed (database write succeeded): {}", e),
    }
}
