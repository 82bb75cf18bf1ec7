// Seams to the external collaborators
//
// The notification core never talks to a database, a realtime channel or a
// platform notification API directly. Each is a trait so the listener and
// reconciler can run against Postgres in production and in-memory fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreError;
use crate::notification::{Notification, PlatformNotification};

// ============================================================================
// NotificationStore
// ============================================================================

/// Durable record of notifications per user
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// All notifications of a user, newest first
    async fn fetch_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;

    /// Set `is_read = true` on one notification owned by `user_id`
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    /// Set `is_read = true` on every unread notification of `user_id`.
    ///
    /// Returns the number of rows changed.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete the listed notifications owned by `user_id`.
    ///
    /// Returns the number of rows deleted.
    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;
}

// ============================================================================
// ChangeFeed
// ============================================================================

/// Row-level change delivered by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert { record: Notification },
    Update { record: Notification },
    Delete { id: Uuid, user_id: Uuid },
}

impl ChangeEvent {
    /// Owner of the changed row
    pub fn user_id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => record.user_id,
            ChangeEvent::Delete { user_id, .. } => *user_id,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => record.id,
            ChangeEvent::Delete { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
        }
    }
}

/// Live, cancellable stream of change events for one user
///
/// The stream ends when the feed closes or the subscription is cancelled.
/// Dropping the subscription cancels it.
pub struct Subscription {
    user_id: Uuid,
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(
        user_id: Uuid,
        events: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            user_id,
            events,
            cancel,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Token observed by the producer side of this subscription
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once cancelled or closed
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Source of realtime row changes
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes of rows owned by `user_id`
    async fn subscribe(&self, user_id: Uuid) -> Result<Subscription, StoreError>;
}

// ============================================================================
// Platform notifications
// ============================================================================

/// Platform permission to show out-of-band notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Not asked yet
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// Platform permission state (process-wide in the real platform)
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn current(&self) -> PermissionState;

    /// Ask the user. May never resolve if the user ignores the prompt.
    async fn request(&self) -> PermissionState;
}

/// Shows platform notifications. Fire-and-forget.
pub trait PlatformNotifier: Send + Sync {
    fn show(&self, notification: &PlatformNotification);
}
