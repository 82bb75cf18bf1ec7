// Storage configuration

use cellarclub_core::NotificationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl StorageConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: Postgres connection string (required)
    /// - `CELLARCLUB_DB_MAX_CONNECTIONS`: pool size (default: 5)
    pub fn from_env() -> Result<Self, NotificationError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| NotificationError::config("DATABASE_URL is not set"))?;
        let mut config = Self::new(database_url);

        if let Ok(value) = std::env::var("CELLARCLUB_DB_MAX_CONNECTIONS") {
            config.max_connections = value.parse().map_err(|_| {
                NotificationError::config(format!(
                    "CELLARCLUB_DB_MAX_CONNECTIONS must be a number, got {:?}",
                    value
                ))
            })?;
        }
        Ok(config)
    }
}
