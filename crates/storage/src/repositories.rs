// Repository layer for database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::*;

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Create database connection pool from configuration
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Notifications
    // ============================================

    pub async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<NotificationRow>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, type, title, message, is_read, related_id, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// One notification, scoped to its owner
    pub async fn get_notification(&self, user_id: Uuid, id: Uuid) -> Result<Option<NotificationRow>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, type, title, message, is_read, related_id, created_at
            FROM notifications
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Returns the number of rows flipped (0 when already read or not owned)
    pub async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE id = $1 AND user_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_notifications(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Insert one row per recipient in a single statement
    pub async fn create_notifications(
        &self,
        input: CreateNotifications,
    ) -> Result<Vec<NotificationRow>> {
        if input.user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (user_id, type, title, message, related_id)
            SELECT recipient, $2, $3, $4, $5
            FROM UNNEST($1::uuid[]) AS recipient
            RETURNING id, user_id, type, title, message, is_read, related_id, created_at
            "#,
        )
        .bind(&input.user_ids)
        .bind(&input.notification_type)
        .bind(&input.title)
        .bind(&input.message)
        .bind(input.related_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Delete notifications created before `cutoff`
    pub async fn delete_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Members
    // ============================================

    pub async fn list_approved_member_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM profiles
            WHERE is_approved = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ============================================
    // Wines of the Month
    // ============================================

    pub async fn get_available_bonus(&self, month: u32, year: i32) -> Result<Option<BonusRow>> {
        let row = sqlx::query_as::<_, BonusRow>(
            r#"
            SELECT id, month, year, is_available
            FROM monthly_wine_bonuses
            WHERE month = $1 AND year = $2 AND is_available = TRUE
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Approved members without a claim on `bonus_id`
    pub async fn list_unclaimed_member_ids(&self, bonus_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT p.user_id
            FROM profiles p
            WHERE p.is_approved = TRUE
              AND NOT EXISTS (
                SELECT 1 FROM user_bonus_claims c
                WHERE c.bonus_id = $1 AND c.user_id = p.user_id
              )
            ORDER BY p.created_at ASC
            "#,
        )
        .bind(bonus_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
