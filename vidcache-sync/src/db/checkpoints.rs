//! Scan checkpoint persistence
//!
//! A single row records the phase and progress of the latest scan so an
//! interrupted run can be identified after a crash. Checkpoints are for
//! diagnostics only; scans always restart from the beginning.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vidcache_common::Result;

const CHECKPOINT_ROW_ID: &str = "scan_checkpoint";

/// Checkpoints older than this are ignored
pub const CHECKPOINT_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScanCheckpoint {
    pub scan_id: String,
    pub scan_type: String,
    pub phase: String,
    pub processed_files: i64,
    pub total_files: i64,
    pub last_processed_path: Option<String>,
    pub last_checkpoint_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl ScanCheckpoint {
    pub fn new(scan_id: &str, scan_type: &str, phase: &str) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            scan_type: scan_type.to_string(),
            phase: phase.to_string(),
            processed_files: 0,
            total_files: 0,
            last_processed_path: None,
            last_checkpoint_at: Utc::now(),
            is_valid: true,
        }
    }
}

/// Summary exposed through the status surface
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointInfo {
    pub scan_id: String,
    pub phase: String,
    pub processed_files: i64,
    pub total_files: i64,
    pub last_checkpoint_at: DateTime<Utc>,
    /// Hours since the checkpoint was written
    pub age_hours: i64,
}

/// Overwrite the checkpoint row
pub async fn save_checkpoint(pool: &SqlitePool, checkpoint: &ScanCheckpoint) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scan_checkpoints (
            id, scan_id, scan_type, phase, processed_files, total_files,
            last_processed_path, last_checkpoint_at, is_valid
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            scan_id = excluded.scan_id,
            scan_type = excluded.scan_type,
            phase = excluded.phase,
            processed_files = excluded.processed_files,
            total_files = excluded.total_files,
            last_processed_path = excluded.last_processed_path,
            last_checkpoint_at = excluded.last_checkpoint_at,
            is_valid = excluded.is_valid
        "#,
    )
    .bind(CHECKPOINT_ROW_ID)
    .bind(&checkpoint.scan_id)
    .bind(&checkpoint.scan_type)
    .bind(&checkpoint.phase)
    .bind(checkpoint.processed_files)
    .bind(checkpoint.total_files)
    .bind(&checkpoint.last_processed_path)
    .bind(checkpoint.last_checkpoint_at)
    .bind(checkpoint.is_valid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the checkpoint if it is valid and inside the validity window
pub async fn load_valid_checkpoint(pool: &SqlitePool) -> Result<Option<ScanCheckpoint>> {
    let row = sqlx::query_as::<_, ScanCheckpoint>(
        r#"
        SELECT scan_id, scan_type, phase, processed_files, total_files,
               last_processed_path, last_checkpoint_at, is_valid
        FROM scan_checkpoints
        WHERE id = ? AND is_valid = 1
        "#,
    )
    .bind(CHECKPOINT_ROW_ID)
    .fetch_optional(pool)
    .await?;

    let cutoff = Utc::now() - Duration::hours(CHECKPOINT_VALIDITY_HOURS);
    Ok(row.filter(|c| c.last_checkpoint_at >= cutoff))
}

pub async fn invalidate_checkpoint(pool: &SqlitePool) -> Result<()> {
    sqlx::query("UPDATE scan_checkpoints SET is_valid = 0 WHERE id = ?")
        .bind(CHECKPOINT_ROW_ID)
        .execute(pool)
        .await?;
    Ok(())
}

/// Diagnostic summary of a valid checkpoint
pub async fn checkpoint_info(pool: &SqlitePool) -> Result<Option<CheckpointInfo>> {
    Ok(load_valid_checkpoint(pool).await?.map(|c| CheckpointInfo {
        age_hours: (Utc::now() - c.last_checkpoint_at).num_hours(),
        scan_id: c.scan_id,
        phase: c.phase,
        processed_files: c.processed_files,
        total_files: c.total_files,
        last_checkpoint_at: c.last_checkpoint_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_save_and_load() {
        let pool = test_pool().await;
        let mut cp = ScanCheckpoint::new("scan_1", "full", "metadata");
        cp.processed_files = 5;
        cp.total_files = 10;
        save_checkpoint(&pool, &cp).await.unwrap();

        let loaded = load_valid_checkpoint(&pool).await.unwrap().unwrap();
        assert_eq!(loaded.scan_id, "scan_1");
        assert_eq!(loaded.processed_files, 5);

        let info = checkpoint_info(&pool).await.unwrap().unwrap();
        assert_eq!(info.phase, "metadata");
        assert_eq!(info.age_hours, 0);
    }

    #[tokio::test]
    async fn test_invalidated_checkpoint_is_hidden() {
        let pool = test_pool().await;
        save_checkpoint(&pool, &ScanCheckpoint::new("scan_1", "full", "discovery"))
            .await
            .unwrap();
        invalidate_checkpoint(&pool).await.unwrap();
        assert!(load_valid_checkpoint(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_checkpoint_is_hidden() {
        let pool = test_pool().await;
        let mut cp = ScanCheckpoint::new("scan_old", "full", "database");
        cp.last_checkpoint_at = Utc::now() - Duration::hours(CHECKPOINT_VALIDITY_HOURS + 1);
        save_checkpoint(&pool, &cp).await.unwrap();
        assert!(load_valid_checkpoint(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_save_overwrites_single_row() {
        let pool = test_pool().await;
        save_checkpoint(&pool, &ScanCheckpoint::new("scan_1", "full", "discovery"))
            .await
            .unwrap();
        save_checkpoint(&pool, &ScanCheckpoint::new("scan_2", "full", "metadata"))
            .await
            .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scan_checkpoints")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(load_valid_checkpoint(&pool).await.unwrap().unwrap().scan_id, "scan_2");
    }
}
