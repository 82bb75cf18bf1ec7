// Connections shared by every command

use std::sync::Arc;

use anyhow::{Context as _, Result};
use cellarclub_core::{NotificationConfig, NotificationServices, PermissionState};
use cellarclub_storage::{
    create_pg_notification_store, Database, NotificationPublisher, PgChangeFeed, StorageConfig,
};

use crate::platform::{ConsoleNotifier, TerminalPermissionProvider};

pub struct Context {
    pub db: Database,
    pub config: NotificationConfig,
}

impl Context {
    pub async fn connect(storage: StorageConfig, config: NotificationConfig) -> Result<Self> {
        let db = Database::from_config(&storage)
            .await
            .context("failed to connect to the database")?;
        Ok(Self { db, config })
    }

    /// Store, feed and terminal adapters for a member session
    pub fn services(&self, permission: PermissionState) -> NotificationServices {
        let feed = PgChangeFeed::new(self.db.clone()).with_buffer(self.config.feed_buffer);
        NotificationServices::new(
            Arc::new(create_pg_notification_store(self.db.clone())),
            Arc::new(feed),
            Arc::new(TerminalPermissionProvider::new(permission)),
            Arc::new(ConsoleNotifier),
        )
        .with_config(self.config.clone())
    }

    pub fn publisher(&self) -> NotificationPublisher {
        NotificationPublisher::new(self.db.clone())
    }
}
