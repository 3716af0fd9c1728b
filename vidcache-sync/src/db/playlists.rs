//! Playlist and membership database operations
//!
//! Playlists are never deleted: ones whose directory disappeared are
//! deactivated so historical membership survives.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use vidcache_common::Result;

use crate::models::PlaylistEntry;

/// Upsert detected playlists as active and deactivate every other one
///
/// Returns the number of playlists deactivated.
pub async fn sync_playlists(pool: &SqlitePool, detected: &[PlaylistEntry]) -> Result<u64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for playlist in detected {
        sqlx::query(
            r#"
            INSERT INTO playlists (id, name, path, root_path, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                root_path = excluded.root_path,
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&playlist.id)
        .bind(&playlist.name)
        .bind(&playlist.path)
        .bind(&playlist.root_path)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let active_rows: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM playlists WHERE is_active = 1")
            .fetch_all(&mut *tx)
            .await?;

    let mut deactivated = 0;
    for (id,) in active_rows {
        if detected.iter().any(|p| p.id == id) {
            continue;
        }
        deactivated += sqlx::query("UPDATE playlists SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(deactivated)
}

pub async fn load_playlists(pool: &SqlitePool) -> Result<Vec<PlaylistEntry>> {
    let rows = sqlx::query_as::<_, PlaylistEntry>(
        "SELECT id, name, path, root_path, is_active FROM playlists ORDER BY path",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Make `playlist_id` the only playlist linked to `video_row_id`
///
/// `None` removes every link for the video.
pub async fn reconcile_membership(
    conn: &mut SqliteConnection,
    video_row_id: &str,
    playlist_id: Option<&str>,
) -> Result<()> {
    match playlist_id {
        Some(playlist_id) => {
            sqlx::query("DELETE FROM playlist_videos WHERE video_id = ? AND playlist_id <> ?")
                .bind(video_row_id)
                .bind(playlist_id)
                .execute(&mut *conn)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO playlist_videos (playlist_id, video_id, added_at)
                VALUES (?, ?, ?)
                ON CONFLICT(playlist_id, video_id) DO NOTHING
                "#,
            )
            .bind(playlist_id)
            .bind(video_row_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM playlist_videos WHERE video_id = ?")
                .bind(video_row_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Playlist ids linked to a video row
pub async fn playlists_for_video(pool: &SqlitePool, video_row_id: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT playlist_id FROM playlist_videos WHERE video_id = ? ORDER BY playlist_id")
            .bind(video_row_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn playlist(id: &str, path: &str) -> PlaylistEntry {
        PlaylistEntry {
            id: id.to_string(),
            name: path.to_string(),
            path: path.to_string(),
            root_path: "/videos".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_stale_playlist_is_deactivated_not_deleted() {
        let pool = test_pool().await;
        sync_playlists(&pool, &[playlist("p1", "anime"), playlist("p2", "drama")])
            .await
            .unwrap();

        let deactivated = sync_playlists(&pool, &[playlist("p1", "anime")]).await.unwrap();
        assert_eq!(deactivated, 1);

        let all = load_playlists(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
        let drama = all.iter().find(|p| p.id == "p2").unwrap();
        assert!(!drama.is_active);
    }

    #[tokio::test]
    async fn test_redetected_playlist_is_reactivated() {
        let pool = test_pool().await;
        sync_playlists(&pool, &[playlist("p1", "anime")]).await.unwrap();
        sync_playlists(&pool, &[]).await.unwrap();
        sync_playlists(&pool, &[playlist("p1", "anime")]).await.unwrap();

        let all = load_playlists(&pool).await.unwrap();
        assert!(all[0].is_active);
    }

    #[tokio::test]
    async fn test_membership_keeps_at_most_one_link() {
        let pool = test_pool().await;
        sync_playlists(&pool, &[playlist("p1", "anime"), playlist("p2", "drama")])
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        reconcile_membership(&mut conn, "v1", Some("p1")).await.unwrap();
        reconcile_membership(&mut conn, "v1", Some("p2")).await.unwrap();
        reconcile_membership(&mut conn, "v1", Some("p2")).await.unwrap();
        drop(conn);
        assert_eq!(playlists_for_video(&pool, "v1").await.unwrap(), vec!["p2".to_string()]);

        let mut conn = pool.acquire().await.unwrap();
        reconcile_membership(&mut conn, "v1", None).await.unwrap();
        drop(conn);
        assert!(playlists_for_video(&pool, "v1").await.unwrap().is_empty());
    }
}
