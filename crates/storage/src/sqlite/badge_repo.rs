use lms_core::model::{Badge, BadgeId};

use super::{SqliteRepository, mapping::map_badge_row};
use crate::repository::{BadgeRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl BadgeRepository for SqliteRepository {
    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO badges (id, title, content, xp_threshold, asset_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                xp_threshold = excluded.xp_threshold,
                asset_url = excluded.asset_url
            ",
        )
        .bind(badge.id().to_string())
        .bind(badge.title())
        .bind(badge.content())
        .bind(badge.xp_threshold())
        .bind(badge.asset().map(url::Url::as_str))
        .bind(badge.created_at())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, content, xp_threshold, asset_url, created_at
            FROM badges
            ORDER BY xp_threshold ASC, title ASC
            ",
        )
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let mut badges = Vec::with_capacity(rows.len());
        for row in rows {
            badges.push(map_badge_row(&row)?);
        }
        Ok(badges)
    }

    async fn delete_badge(&self, id: BadgeId) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let badge = id.to_string();

        // Bump holders' versions so any in-flight reconciliation snapshot
        // taken before the delete fails its conditional write.
        sqlx::query(
            r"
            UPDATE users SET badge_version = badge_version + 1
            WHERE id IN (SELECT user_id FROM user_badges WHERE badge_id = ?1)
            ",
        )
        .bind(&badge)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Holdings go with the badge via ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM badges WHERE id = ?1")
            .bind(&badge)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        if deleted.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
