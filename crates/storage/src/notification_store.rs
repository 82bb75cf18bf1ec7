// Database-backed NotificationStore implementation
//
// This module implements the core NotificationStore trait on top of the
// notifications table. Row changes made here reach live sessions through the
// notifications trigger and the LISTEN/NOTIFY change feed, not through this
// store.

use async_trait::async_trait;
use cellarclub_core::{Notification, NotificationStore, StoreError};
use uuid::Uuid;

use crate::repositories::Database;

// ============================================================================
// PgNotificationStore - notifications table
// ============================================================================

/// Database-backed notification store
#[derive(Clone)]
pub struct PgNotificationStore {
    db: Database,
}

impl PgNotificationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Classify a repository error for the core
pub(crate) fn store_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<sqlx::Error>() {
        Some(
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_),
        ) => StoreError::Unavailable(err.to_string()),
        Some(sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            StoreError::Serialization(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn fetch_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = self
            .db
            .list_notifications(user_id)
            .await
            .map_err(store_error)?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let rows = self
            .db
            .mark_notification_read(user_id, id)
            .await
            .map_err(store_error)?;
        if rows == 0 {
            tracing::debug!(user_id = %user_id, id = %id, "Notification already read or gone");
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.db
            .mark_all_notifications_read(user_id)
            .await
            .map_err(store_error)
    }

    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.db
            .delete_notifications(user_id, ids)
            .await
            .map_err(store_error)
    }
}

// ============================================================================
// Factory functions
// ============================================================================

/// Create a database-backed notification store
pub fn create_pg_notification_store(db: Database) -> PgNotificationStore {
    PgNotificationStore::new(db)
}
