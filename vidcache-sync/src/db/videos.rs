//! Catalog (videos table) database operations

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use vidcache_common::Result;

use crate::models::{CatalogEntry, VideoRecord};

const SELECT_COLUMNS: &str = "id, file_path, file_name, title, file_size, duration, episode, year, \
     video_id, thumbnail_path, last_modified, scanned_at, metadata_extracted_at";

/// Load the full catalog
pub async fn load_all_videos(pool: &SqlitePool) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query_as::<_, CatalogEntry>(&format!(
        "SELECT {} FROM videos ORDER BY file_path",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Load one entry by its unique path
pub async fn find_by_path(pool: &SqlitePool, file_path: &str) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query_as::<_, CatalogEntry>(&format!(
        "SELECT {} FROM videos WHERE file_path = ?",
        SELECT_COLUMNS
    ))
    .bind(file_path)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn count_videos(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM videos")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Every catalog path
pub async fn load_all_paths(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM videos")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(p,)| p).collect())
}

/// Row removed by [`delete_by_paths`]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeletedVideo {
    pub id: String,
    pub file_path: String,
    pub video_id: String,
    pub thumbnail_path: Option<String>,
}

/// Delete rows (and their playlist links) for the given paths
///
/// Returns the deleted rows so the caller can clean up thumbnails after
/// commit.
pub async fn delete_by_paths(
    conn: &mut SqliteConnection,
    paths: &[String],
) -> Result<Vec<DeletedVideo>> {
    let mut deleted = Vec::with_capacity(paths.len());

    for path in paths {
        let row = sqlx::query_as::<_, DeletedVideo>(
            "SELECT id, file_path, video_id, thumbnail_path FROM videos WHERE file_path = ?",
        )
        .bind(path)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else { continue };

        sqlx::query("DELETE FROM playlist_videos WHERE video_id = ?")
            .bind(&row.id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(&row.id)
            .execute(&mut *conn)
            .await?;

        deleted.push(row);
    }

    Ok(deleted)
}

/// Insert or update a record keyed on `file_path`
///
/// An existing row keeps its `id`; the stored id is returned so playlist
/// links always point at the surviving row.
pub async fn upsert_video(
    conn: &mut SqliteConnection,
    record: &VideoRecord,
    scanned_at: DateTime<Utc>,
) -> Result<String> {
    let (id,): (String,) = sqlx::query_as(
        r#"
        INSERT INTO videos (
            id, file_path, file_name, title, file_size, duration, episode, year,
            video_id, thumbnail_path, last_modified, scanned_at, metadata_extracted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_path) DO UPDATE SET
            file_name = excluded.file_name,
            title = excluded.title,
            file_size = excluded.file_size,
            duration = excluded.duration,
            episode = excluded.episode,
            year = excluded.year,
            video_id = excluded.video_id,
            thumbnail_path = excluded.thumbnail_path,
            last_modified = excluded.last_modified,
            scanned_at = excluded.scanned_at,
            metadata_extracted_at = excluded.metadata_extracted_at
        RETURNING id
        "#,
    )
    .bind(&record.id)
    .bind(&record.file_path)
    .bind(&record.file_name)
    .bind(&record.title)
    .bind(record.file_size)
    .bind(record.duration)
    .bind(record.episode)
    .bind(record.year)
    .bind(&record.video_id)
    .bind(&record.thumbnail_path)
    .bind(record.last_modified)
    .bind(scanned_at)
    .bind(record.metadata_extracted_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn record(id: &str, path: &str, size: i64) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            title: "title".to_string(),
            file_size: size,
            duration: Some(60),
            episode: None,
            year: None,
            video_id: "vid".to_string(),
            thumbnail_path: None,
            last_modified: Utc::now(),
            playlist_id: None,
            metadata_extracted_at: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_preserves_existing_id() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = upsert_video(&mut conn, &record("id-1", "/v/a.mp4", 100), Utc::now())
            .await
            .unwrap();
        let second = upsert_video(&mut conn, &record("id-2", "/v/a.mp4", 150), Utc::now())
            .await
            .unwrap();
        drop(conn);

        assert_eq!(first, "id-1");
        assert_eq!(second, "id-1");

        let entry = find_by_path(&pool, "/v/a.mp4").await.unwrap().unwrap();
        assert_eq!(entry.id, "id-1");
        assert_eq!(entry.file_size, 150);
        assert_eq!(count_videos(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_paths_returns_rows() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut rec = record("id-1", "/v/a.mp4", 100);
        rec.thumbnail_path = Some("/thumbs/vid.webp".to_string());
        upsert_video(&mut conn, &rec, Utc::now()).await.unwrap();

        let deleted = delete_by_paths(
            &mut conn,
            &["/v/a.mp4".to_string(), "/v/missing.mp4".to_string()],
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].thumbnail_path.as_deref(), Some("/thumbs/vid.webp"));
        assert_eq!(count_videos(&pool).await.unwrap(), 0);
    }
}
