use std::collections::HashSet;

use lms_core::model::{BadgeId, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{ser, user_id_from_text, uuid_from_text},
};
use crate::repository::{LeaderboardRow, StorageError, UserLedger, UserRepository};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn version_from_i64(v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid badge_version: {v}")))
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn apply_xp_delta(&self, user_id: UserId, delta: i64) -> Result<i64, StorageError> {
        // Single statement, so concurrent deltas for the same user can never
        // lose an update.
        let row = sqlx::query(
            r"
            INSERT INTO users (id, xp)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET xp = xp + excluded.xp
            RETURNING xp
            ",
        )
        .bind(user_id.to_string())
        .bind(delta)
        .fetch_one(self.pool())
        .await
        .map_err(conn)?;
        row.try_get("xp").map_err(ser)
    }

    async fn xp(&self, user_id: UserId) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT xp FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;
        match row {
            Some(row) => row.try_get("xp").map_err(ser),
            None => Ok(0),
        }
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> Result<UserLedger, StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();

        sqlx::query("INSERT INTO users (id) VALUES (?1) ON CONFLICT(id) DO NOTHING")
            .bind(&user)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        let row = sqlx::query("SELECT xp, badge_version FROM users WHERE id = ?1")
            .bind(&user)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let xp: i64 = row.try_get("xp").map_err(ser)?;
        let version = version_from_i64(row.try_get::<i64, _>("badge_version").map_err(ser)?)?;

        let badge_rows = sqlx::query("SELECT badge_id FROM user_badges WHERE user_id = ?1")
            .bind(&user)
            .fetch_all(&mut *tx)
            .await
            .map_err(conn)?;
        let mut badges = HashSet::with_capacity(badge_rows.len());
        for row in badge_rows {
            badges.insert(BadgeId::new(uuid_from_text(
                "badge_id",
                &row.try_get::<String, _>("badge_id").map_err(ser)?,
            )?));
        }

        tx.commit().await.map_err(conn)?;
        Ok(UserLedger {
            xp,
            badges,
            version,
        })
    }

    async fn apply_badge_diff(
        &self,
        user_id: UserId,
        expected_version: u64,
        grant: &[BadgeId],
        revoke: &[BadgeId],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();

        let expected = i64::try_from(expected_version)
            .map_err(|_| StorageError::Serialization("badge_version overflow".into()))?;
        let guarded = sqlx::query(
            r"
            UPDATE users SET badge_version = badge_version + 1
            WHERE id = ?1 AND badge_version = ?2
            ",
        )
        .bind(&user)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        if guarded.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        for badge_id in grant {
            sqlx::query(
                r"
                INSERT INTO user_badges (user_id, badge_id)
                VALUES (?1, ?2)
                ON CONFLICT(user_id, badge_id) DO NOTHING
                ",
            )
            .bind(&user)
            .bind(badge_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }
        for badge_id in revoke {
            sqlx::query("DELETE FROM user_badges WHERE user_id = ?1 AND badge_id = ?2")
                .bind(&user)
                .bind(badge_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT u.id AS user_id, u.xp AS xp, ub.badge_id AS badge_id
            FROM (
                SELECT id, xp FROM users
                ORDER BY xp DESC, id ASC
                LIMIT ?1
            ) u
            LEFT JOIN user_badges ub ON ub.user_id = u.id
            ORDER BY u.xp DESC, u.id ASC, ub.badge_id ASC
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let mut out: Vec<LeaderboardRow> = Vec::new();
        for row in rows {
            let user_id = user_id_from_text(&row.try_get::<String, _>("user_id").map_err(ser)?)?;
            let xp: i64 = row.try_get("xp").map_err(ser)?;
            let badge_id = row
                .try_get::<Option<String>, _>("badge_id")
                .map_err(ser)?
                .map(|raw| uuid_from_text("badge_id", &raw).map(BadgeId::new))
                .transpose()?;

            match out.last_mut() {
                Some(last) if last.user_id == user_id => {
                    if let Some(id) = badge_id {
                        last.badge_ids.push(id);
                    }
                }
                _ => out.push(LeaderboardRow {
                    user_id,
                    xp,
                    badge_ids: badge_id.into_iter().collect(),
                }),
            }
        }
        Ok(out)
    }
}
