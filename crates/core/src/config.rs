// Notification core configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the listener, reconciler and permission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Age after which the store prunes notifications
    pub retention_days: u32,

    /// Default page size for paginated views
    pub page_size: usize,

    /// Upper bound on waiting for the user to answer the permission prompt
    #[serde(with = "duration_secs")]
    pub permission_timeout: Duration,

    /// Buffered change events per subscription
    pub feed_buffer: usize,

    /// Buffered transient notices per session
    pub notice_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            page_size: 10,
            permission_timeout: Duration::from_secs(30),
            feed_buffer: 256,
            notice_capacity: 32,
        }
    }
}

impl NotificationConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `CELLARCLUB_RETENTION_DAYS`: Retention horizon in days (default: 30)
    /// - `CELLARCLUB_PAGE_SIZE`: Notifications per page (default: 10)
    /// - `CELLARCLUB_PERMISSION_TIMEOUT_SECS`: Permission prompt timeout (default: 30)
    /// - `CELLARCLUB_FEED_BUFFER`: Change events buffered per subscription (default: 256)
    /// - `CELLARCLUB_NOTICE_CAPACITY`: Transient notices buffered (default: 32)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retention_days: env_parse("CELLARCLUB_RETENTION_DAYS", defaults.retention_days),
            page_size: env_parse("CELLARCLUB_PAGE_SIZE", defaults.page_size).max(1),
            permission_timeout: Duration::from_secs(env_parse(
                "CELLARCLUB_PERMISSION_TIMEOUT_SECS",
                defaults.permission_timeout.as_secs(),
            )),
            feed_buffer: env_parse("CELLARCLUB_FEED_BUFFER", defaults.feed_buffer).max(1),
            notice_capacity: env_parse("CELLARCLUB_NOTICE_CAPACITY", defaults.notice_capacity)
                .max(1),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

fn env_parse<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
