// Postgres storage layer with sqlx
//
// This crate provides database implementations for core traits:
// - PgNotificationStore: implements NotificationStore on the notifications table
// - PgChangeFeed: implements ChangeFeed over LISTEN/NOTIFY
// - NotificationPublisher: fan-out producers and the retention sweep

pub mod change_feed;
pub mod config;
pub mod models;
pub mod notification_store;
pub mod publisher;
pub mod repositories;

pub use change_feed::{parse_signal, ChangeOp, ChangeSignal, PgChangeFeed, NOTIFY_CHANNEL};
pub use config::StorageConfig;
pub use models::*;
pub use notification_store::{create_pg_notification_store, PgNotificationStore};
pub use publisher::{retention_cutoff, NotificationPublisher};
pub use repositories::{Database, MIGRATOR};
