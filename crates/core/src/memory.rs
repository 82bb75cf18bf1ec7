// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Unit and integration tests (with failure injection)
// - Demos that don't need a database
// - Quick prototyping of new delivery channels

use std::collections::HashSet;
use std::future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreError;
use crate::notification::{Notification, NotificationDraft, PlatformNotification};
use crate::traits::{
    ChangeEvent, ChangeFeed, NotificationStore, PermissionProvider, PermissionState,
    PlatformNotifier, Subscription,
};

// ============================================================================
// InMemoryNotificationStore - store and change feed in one
// ============================================================================

struct Subscriber {
    user_id: Uuid,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Failures {
    fetch: AtomicBool,
    mutations: AtomicBool,
    subscribe: AtomicBool,
}

#[derive(Default)]
struct Calls {
    fetch: AtomicUsize,
    mark_read: AtomicUsize,
    mark_all_read: AtomicUsize,
    delete: AtomicUsize,
}

struct Inner {
    rows: RwLock<Vec<Notification>>,
    subscribers: Mutex<Vec<Subscriber>>,
    failures: Failures,
    calls: Calls,
    feed_buffer: usize,
}

/// In-memory notification store with a built-in change feed
///
/// Every mutation (through the trait or the helper methods) publishes the
/// matching change event to subscribers of the row's owner, the way a
/// database with realtime replication would.
#[derive(Clone)]
pub struct InMemoryNotificationStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_feed_buffer(256)
    }

    pub fn with_feed_buffer(feed_buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: RwLock::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                failures: Failures::default(),
                calls: Calls::default(),
                feed_buffer: feed_buffer.max(1),
            }),
        }
    }

    /// Pre-populate rows without publishing events (history before login)
    pub fn seed(&self, notifications: Vec<Notification>) {
        self.inner.rows.write().extend(notifications);
    }

    /// Insert a row and publish it
    pub async fn insert(&self, notification: Notification) {
        self.inner.rows.write().push(notification.clone());
        self.publish(ChangeEvent::Insert {
            record: notification,
        })
        .await;
    }

    /// Insert one row per recipient
    pub async fn send_to_users(
        &self,
        draft: &NotificationDraft,
        user_ids: &[Uuid],
    ) -> Vec<Notification> {
        let mut created = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let notification = Notification::from_draft(*user_id, draft);
            self.insert(notification.clone()).await;
            created.push(notification);
        }
        created
    }

    /// Overwrite a row (e.g. read-state changed on another device) and publish it
    pub async fn update(&self, notification: Notification) -> Result<(), StoreError> {
        {
            let mut rows = self.inner.rows.write();
            let row = rows
                .iter_mut()
                .find(|n| n.id == notification.id)
                .ok_or(StoreError::NotFound(notification.id))?;
            *row = notification.clone();
        }
        self.publish(ChangeEvent::Update {
            record: notification,
        })
        .await;
        Ok(())
    }

    /// Delete a row from outside the session and publish it
    pub async fn remove(&self, id: Uuid) -> Option<Notification> {
        let removed = {
            let mut rows = self.inner.rows.write();
            let index = rows.iter().position(|n| n.id == id)?;
            rows.remove(index)
        };
        self.publish(ChangeEvent::Delete {
            id,
            user_id: removed.user_id,
        })
        .await;
        Some(removed)
    }

    /// Retention sweep: drop rows created before `cutoff`
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<Notification> = {
            let mut rows = self.inner.rows.write();
            let (expired, kept): (Vec<_>, Vec<_>) =
                rows.drain(..).partition(|n| n.created_at < cutoff);
            *rows = kept;
            expired
        };
        for n in &expired {
            self.publish(ChangeEvent::Delete {
                id: n.id,
                user_id: n.user_id,
            })
            .await;
        }
        expired.len()
    }

    /// Deliver an event to every live subscriber of its owner
    ///
    /// Public so tests can simulate at-least-once redelivery.
    pub async fn publish(&self, event: ChangeEvent) {
        let targets: Vec<mpsc::Sender<ChangeEvent>> = {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
            subscribers
                .iter()
                .filter(|s| s.user_id == event.user_id())
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in targets {
            if tx.send(event.clone()).await.is_err() {
                tracing::debug!(id = %event.id(), "Subscriber went away before delivery");
            }
        }
    }

    /// Rows of a user, newest first
    pub fn rows_for(&self, user_id: Uuid) -> Vec<Notification> {
        let mut rows: Vec<Notification> = self
            .inner
            .rows
            .read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.read().is_empty()
    }

    /// Live subscriptions (cancelled ones are not counted)
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| !s.cancel.is_cancelled() && !s.tx.is_closed())
            .count()
    }

    /// Drop every subscriber's sender, as a lost feed connection would
    pub fn close_feed(&self) {
        self.inner.subscribers.lock().clear();
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.inner.failures.fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.inner.failures.mutations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.inner.failures.subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.calls.fetch.load(Ordering::SeqCst)
    }

    pub fn mark_read_calls(&self) -> usize {
        self.inner.calls.mark_read.load(Ordering::SeqCst)
    }

    pub fn mark_all_read_calls(&self) -> usize {
        self.inner.calls.mark_all_read.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.inner.calls.delete.load(Ordering::SeqCst)
    }

    fn check_mutation(&self) -> Result<(), StoreError> {
        if self.inner.failures.mutations.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected mutation failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn fetch_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        self.inner.calls.fetch.fetch_add(1, Ordering::SeqCst);
        if self.inner.failures.fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fetch failure".into()));
        }
        Ok(self.rows_for(user_id))
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        self.inner.calls.mark_read.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        let updated = {
            let mut rows = self.inner.rows.write();
            rows.iter_mut()
                .find(|n| n.id == id && n.user_id == user_id)
                .map(|n| {
                    n.is_read = true;
                    n.clone()
                })
        };
        if let Some(record) = updated {
            self.publish(ChangeEvent::Update { record }).await;
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.inner.calls.mark_all_read.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        let updated: Vec<Notification> = {
            let mut rows = self.inner.rows.write();
            rows.iter_mut()
                .filter(|n| n.user_id == user_id && !n.is_read)
                .map(|n| {
                    n.is_read = true;
                    n.clone()
                })
                .collect()
        };
        let count = updated.len() as u64;
        for record in updated {
            self.publish(ChangeEvent::Update { record }).await;
        }
        Ok(count)
    }

    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.inner.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        let targets: HashSet<&Uuid> = ids.iter().collect();
        let deleted: Vec<Uuid> = {
            let mut rows = self.inner.rows.write();
            let mut deleted = Vec::new();
            rows.retain(|n| {
                let hit = n.user_id == user_id && targets.contains(&n.id);
                if hit {
                    deleted.push(n.id);
                }
                !hit
            });
            deleted
        };
        let count = deleted.len() as u64;
        for id in deleted {
            self.publish(ChangeEvent::Delete { id, user_id }).await;
        }
        Ok(count)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryNotificationStore {
    async fn subscribe(&self, user_id: Uuid) -> Result<Subscription, StoreError> {
        if self.inner.failures.subscribe.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected subscribe failure".into()));
        }
        let (tx, rx) = mpsc::channel(self.inner.feed_buffer);
        let cancel = CancellationToken::new();
        self.inner.subscribers.lock().push(Subscriber {
            user_id,
            tx,
            cancel: cancel.clone(),
        });
        Ok(Subscription::new(user_id, rx, cancel))
    }
}

// ============================================================================
// StaticPermissionProvider - scripted permission answers
// ============================================================================

/// Permission provider with a fixed answer to the prompt
pub struct StaticPermissionProvider {
    current: Mutex<PermissionState>,
    answer: Option<PermissionState>,
    requests: AtomicUsize,
}

impl StaticPermissionProvider {
    /// `answer` becomes the current state once the prompt is answered
    pub fn new(current: PermissionState, answer: PermissionState) -> Self {
        Self {
            current: Mutex::new(current),
            answer: Some(answer),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, PermissionState::Granted)
    }

    /// Prompt that the user never answers
    pub fn never_answers() -> Self {
        Self {
            current: Mutex::new(PermissionState::Default),
            answer: None,
            requests: AtomicUsize::new(0),
        }
    }

    /// Change the platform setting out-of-band
    pub fn set_current(&self, state: PermissionState) {
        *self.current.lock() = state;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissionProvider {
    fn current(&self) -> PermissionState {
        *self.current.lock()
    }

    async fn request(&self) -> PermissionState {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some(answer) => {
                *self.current.lock() = answer;
                answer
            }
            None => future::pending().await,
        }
    }
}

// ============================================================================
// RecordingNotifier - captures platform notifications
// ============================================================================

/// Platform notifier that records what would have been shown
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<PlatformNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<PlatformNotification> {
        self.shown.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.shown.lock().iter().map(|n| n.tag.clone()).collect()
    }

    pub fn clear(&self) {
        self.shown.lock().clear();
    }
}

impl PlatformNotifier for RecordingNotifier {
    fn show(&self, notification: &PlatformNotification) {
        self.shown.lock().push(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;
    use chrono::Duration;

    fn draft() -> NotificationDraft {
        NotificationDraft::new(NotificationType::General, "Hi", "There")
    }

    #[tokio::test]
    async fn test_fetch_is_newest_first_and_scoped() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        let mut old = Notification::from_draft(user, &draft());
        old.created_at = Utc::now() - Duration::days(1);
        let new = Notification::from_draft(user, &draft());
        let other = Notification::from_draft(Uuid::now_v7(), &draft());
        store.seed(vec![old.clone(), new.clone(), other]);

        let rows = store.fetch_for_user(user).await.unwrap();
        assert_eq!(rows.iter().map(|n| n.id).collect::<Vec<_>>(), vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn test_subscription_only_sees_own_rows() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        let mut sub = store.subscribe(user).await.unwrap();

        store.send_to_users(&draft(), &[Uuid::now_v7()]).await;
        let mine = store.send_to_users(&draft(), &[user]).await;

        let event = sub.next().await.unwrap();
        assert_eq!(event.id(), mine[0].id);
        assert_eq!(event.kind(), "insert");
    }

    #[tokio::test]
    async fn test_cancelled_subscribers_are_dropped() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        let mut sub = store.subscribe(user).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        sub.cancel();
        assert_eq!(store.subscriber_count(), 0);
        store.send_to_users(&draft(), &[user]).await;
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_scoped_to_owner() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        let intruder = Uuid::now_v7();
        let rows = store.send_to_users(&draft(), &[user, user]).await;

        assert_eq!(store.delete_many(intruder, &[rows[0].id]).await.unwrap(), 0);
        assert_eq!(store.mark_all_read(intruder).await.unwrap(), 0);
        assert_eq!(store.mark_all_read(user).await.unwrap(), 2);
        assert_eq!(store.delete_many(user, &[rows[0].id]).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        store.fail_fetch(true);
        store.fail_mutations(true);
        store.fail_subscribe(true);

        assert!(store.fetch_for_user(user).await.is_err());
        assert!(store.mark_all_read(user).await.is_err());
        assert!(store.subscribe(user).await.is_err());
        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(store.mark_all_read_calls(), 1);
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let store = InMemoryNotificationStore::new();
        let user = Uuid::now_v7();
        let mut expired = Notification::from_draft(user, &draft());
        expired.created_at = Utc::now() - Duration::days(31);
        store.seed(vec![expired, Notification::from_draft(user, &draft())]);

        let pruned = store.prune_older_than(Utc::now() - Duration::days(30)).await;
        assert_eq!(pruned, 1);
        assert_eq!(store.len(), 1);
    }
}
