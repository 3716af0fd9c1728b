//! Settings database operations
//!
//! Key/value accessors over the `settings` table. Structured settings are
//! stored as JSON under a single key each.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Pool, Sqlite};
use vidcache_common::settings::{ScanSettings, ScheduleSettings};
use vidcache_common::{Error, Result};

const SCAN_SETTINGS_KEY: &str = "scan_settings";
const SCHEDULE_SETTINGS_KEY: &str = "schedule_settings";
const LAST_SCAN_COMPLETED_KEY: &str = "last_scan_completed_at";

/// Load scan settings, falling back to defaults when unset
pub async fn load_scan_settings(db: &Pool<Sqlite>) -> Result<ScanSettings> {
    Ok(load_stored_scan_settings(db).await?.unwrap_or_default())
}

/// Scan settings only if a row exists
pub async fn load_stored_scan_settings(db: &Pool<Sqlite>) -> Result<Option<ScanSettings>> {
    get_json_setting(db, SCAN_SETTINGS_KEY).await
}

pub async fn save_scan_settings(db: &Pool<Sqlite>, settings: &ScanSettings) -> Result<()> {
    set_json_setting(db, SCAN_SETTINGS_KEY, settings).await
}

pub async fn load_stored_schedule_settings(db: &Pool<Sqlite>) -> Result<Option<ScheduleSettings>> {
    get_json_setting(db, SCHEDULE_SETTINGS_KEY).await
}

pub async fn save_schedule_settings(db: &Pool<Sqlite>, settings: &ScheduleSettings) -> Result<()> {
    set_json_setting(db, SCHEDULE_SETTINGS_KEY, settings).await
}

pub async fn get_last_scan_completed_at(db: &Pool<Sqlite>) -> Result<Option<DateTime<Utc>>> {
    get_setting::<DateTime<Utc>>(db, LAST_SCAN_COMPLETED_KEY).await
}

pub async fn set_last_scan_completed_at(db: &Pool<Sqlite>, at: DateTime<Utc>) -> Result<()> {
    set_setting(db, LAST_SCAN_COMPLETED_KEY, at.to_rfc3339()).await
}

async fn get_json_setting<T: DeserializeOwned>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    match get_setting::<String>(db, key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e))),
        None => Ok(None),
    }
}

async fn set_json_setting<T: Serialize>(db: &Pool<Sqlite>, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Serialize setting {} failed: {}", key, e)))?;
    set_setting(db, key, raw).await
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting failed: {}", e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
