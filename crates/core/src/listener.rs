// Delivery Listener
//
// Keeps a live, ordered view of one principal's notifications:
//   Idle -> Fetching -> Live { realtime } -> TornDown
//                   \-> Error
//
// The change feed is subscribed before the initial fetch so nothing committed
// in between is missed; events buffered meanwhile are folded after the fetch is
// installed, and inserts already present from the fetch are de-duplicated without
// a platform popup.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::permission::PermissionGate;
use crate::state::{Applied, ListenerState, NotificationState};
use crate::traits::{ChangeEvent, ChangeFeed, NotificationStore, Subscription};

pub struct DeliveryListener {
    state: Arc<NotificationState>,
    store: Arc<dyn NotificationStore>,
    feed: Arc<dyn ChangeFeed>,
    gate: Arc<PermissionGate>,
    fold_task: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl DeliveryListener {
    pub fn new(
        state: Arc<NotificationState>,
        store: Arc<dyn NotificationStore>,
        feed: Arc<dyn ChangeFeed>,
        gate: Arc<PermissionGate>,
    ) -> Self {
        Self {
            state,
            store,
            feed,
            gate,
            fold_task: Mutex::new(None),
        }
    }

    pub fn principal(&self) -> Uuid {
        self.state.principal()
    }

    pub fn state(&self) -> &Arc<NotificationState> {
        &self.state
    }

    pub fn status(&self) -> ListenerState {
        self.state.status()
    }

    /// Fetch history and go live.
    ///
    /// Can be called again from `Error` (retry) or after the feed dropped to
    /// re-establish realtime delivery. A subscription failure is not an error:
    /// the listener goes `Live { realtime: false }` and serves the fetched rows.
    pub async fn start(&self) -> Result<()> {
        if self.state.is_torn_down() {
            return Err(NotificationError::TornDown);
        }
        let principal = self.principal();
        self.stop_folding();
        self.state.set_status(ListenerState::Fetching);

        let cancel = self.state.cancellation();
        let subscription = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NotificationError::TornDown),
            result = self.feed.subscribe(principal) => result,
        };
        let subscription = match subscription {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(
                    user_id = %principal,
                    error = %NotificationError::Subscription(e),
                    "Falling back to fetch-only notifications"
                );
                None
            }
        };

        match self.state.reconcile(self.store.as_ref()).await {
            Ok(count) => {
                debug!(user_id = %principal, count, "Initial notifications loaded");
            }
            Err(NotificationError::TornDown) => return Err(NotificationError::TornDown),
            Err(e) => {
                error!(user_id = %principal, error = %e, "Failed to load notifications");
                self.state.set_status(ListenerState::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        }

        let realtime = subscription.is_some();
        if let Some(subscription) = subscription {
            let feed_cancel = subscription.cancellation();
            let handle = tokio::spawn(fold_events(
                self.state.clone(),
                self.gate.clone(),
                subscription,
            ));
            *self.fold_task.lock() = Some((handle, feed_cancel));
        }
        self.state.set_status(ListenerState::Live { realtime });
        info!(user_id = %principal, realtime, "Notification listener live");
        Ok(())
    }

    /// Manual refresh; also the recovery path after a fetch error.
    pub async fn refresh(&self) -> Result<usize> {
        let result = self.state.reconcile(self.store.as_ref()).await;
        match &result {
            Ok(_) => {
                if matches!(self.status(), ListenerState::Error { .. }) {
                    self.state.set_status(ListenerState::Live { realtime: false });
                }
            }
            Err(NotificationError::TornDown) => {}
            Err(e) => {
                warn!(user_id = %self.principal(), error = %e, "Notification refresh failed");
                if !self.status().is_live() {
                    self.state.set_status(ListenerState::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
        result
    }

    /// Cancel the subscription; nothing is folded into this state afterwards.
    pub fn teardown(&self) {
        if self.state.is_torn_down() {
            return;
        }
        self.state.tear_down();
        self.stop_folding();
        info!(user_id = %self.principal(), "Notification listener torn down");
    }

    fn stop_folding(&self) {
        if let Some((handle, feed_cancel)) = self.fold_task.lock().take() {
            feed_cancel.cancel();
            handle.abort();
        }
    }
}

impl Drop for DeliveryListener {
    fn drop(&mut self) {
        self.state.tear_down();
        self.stop_folding();
    }
}

async fn fold_events(
    state: Arc<NotificationState>,
    gate: Arc<PermissionGate>,
    mut subscription: Subscription,
) {
    let cancel = state.cancellation();
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = subscription.next() => event,
        };
        let Some(event) = event else {
            if !cancel.is_cancelled() {
                warn!(
                    user_id = %state.principal(),
                    "Change feed closed, falling back to fetch-only notifications"
                );
                state.set_status(ListenerState::Live { realtime: false });
            }
            break;
        };
        fold_one(&state, &gate, event);
    }
    subscription.cancel();
}

fn fold_one(state: &NotificationState, gate: &PermissionGate, event: ChangeEvent) {
    let applied = state.apply_event(&event);
    debug!(
        user_id = %state.principal(),
        id = %event.id(),
        kind = event.kind(),
        ?applied,
        "Folded change event"
    );
    if applied == Applied::Inserted {
        if let ChangeEvent::Insert { record } = &event {
            gate.emit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{InMemoryNotificationStore, RecordingNotifier, StaticPermissionProvider};
    use crate::notification::{Notification, NotificationDraft};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Harness {
        store: InMemoryNotificationStore,
        notifier: Arc<RecordingNotifier>,
        listener: DeliveryListener,
        user: Uuid,
    }

    fn harness() -> Harness {
        let user = Uuid::now_v7();
        let store = InMemoryNotificationStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let gate = Arc::new(PermissionGate::new(
            Arc::new(StaticPermissionProvider::granted()),
            notifier.clone(),
            Duration::from_secs(1),
        ));
        let listener = DeliveryListener::new(
            Arc::new(NotificationState::new(user)),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gate,
        );
        Harness {
            store,
            notifier,
            listener,
            user,
        }
    }

    /// Store and feed that park their calls until released
    #[derive(Clone)]
    struct Gated {
        inner: InMemoryNotificationStore,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl Gated {
        fn new(inner: InMemoryNotificationStore) -> Self {
            Self {
                inner,
                entered: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }

        async fn hold(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    /// Only `subscribe` is held
    struct GatedFeed(Gated);

    #[async_trait]
    impl ChangeFeed for GatedFeed {
        async fn subscribe(&self, user_id: Uuid) -> std::result::Result<Subscription, StoreError> {
            self.0.hold().await;
            self.0.inner.subscribe(user_id).await
        }
    }

    /// Only `fetch_for_user` is held
    struct GatedStore(Gated);

    #[async_trait]
    impl NotificationStore for GatedStore {
        async fn fetch_for_user(
            &self,
            user_id: Uuid,
        ) -> std::result::Result<Vec<Notification>, StoreError> {
            self.0.hold().await;
            self.0.inner.fetch_for_user(user_id).await
        }

        async fn mark_read(&self, user_id: Uuid, id: Uuid) -> std::result::Result<(), StoreError> {
            self.0.inner.mark_read(user_id, id).await
        }

        async fn mark_all_read(&self, user_id: Uuid) -> std::result::Result<u64, StoreError> {
            self.0.inner.mark_all_read(user_id).await
        }

        async fn delete_many(
            &self,
            user_id: Uuid,
            ids: &[Uuid],
        ) -> std::result::Result<u64, StoreError> {
            self.0.inner.delete_many(user_id, ids).await
        }
    }

    fn gated_listener(
        user: Uuid,
        store: Arc<dyn NotificationStore>,
        feed: Arc<dyn ChangeFeed>,
        notifier: Arc<RecordingNotifier>,
    ) -> DeliveryListener {
        let gate = Arc::new(PermissionGate::new(
            Arc::new(StaticPermissionProvider::granted()),
            notifier,
            Duration::from_secs(1),
        ));
        DeliveryListener::new(Arc::new(NotificationState::new(user)), store, feed, gate)
    }

    async fn wait_for_status(listener: &DeliveryListener, expected: ListenerState) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while listener.status() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener did not reach the expected status");
    }

    fn note(user: Uuid) -> Notification {
        Notification::from_draft(user, &NotificationDraft::general("Hi", "There"))
    }

    async fn settle(state: &NotificationState, revision: u64) {
        let mut changes = state.changes();
        tokio::time::timeout(
            Duration::from_secs(1),
            changes.wait_for(|r| *r >= revision),
        )
        .await
        .expect("state did not change")
        .expect("state dropped");
    }

    #[tokio::test]
    async fn test_start_goes_live() {
        let h = harness();
        assert_eq!(h.listener.status(), ListenerState::Idle);
        h.listener.start().await.unwrap();
        assert_eq!(h.listener.status(), ListenerState::Live { realtime: true });
        assert_eq!(h.store.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_is_distinct_from_empty() {
        let h = harness();
        h.store.fail_fetch(true);

        let err = h.listener.start().await.unwrap_err();
        assert!(matches!(err, NotificationError::Fetch(_)));
        assert!(matches!(h.listener.status(), ListenerState::Error { .. }));

        h.store.fail_fetch(false);
        h.listener.start().await.unwrap();
        assert!(h.listener.status().is_live());
    }

    #[tokio::test]
    async fn test_subscription_failure_falls_back_to_fetch_only() {
        let h = harness();
        h.store.seed(vec![note(h.user)]);
        h.store.fail_subscribe(true);

        h.listener.start().await.unwrap();
        assert_eq!(h.listener.status(), ListenerState::Live { realtime: false });
        assert_eq!(h.listener.state().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_update_delete_are_folded() {
        let h = harness();
        h.listener.start().await.unwrap();
        let state = h.listener.state().clone();
        let base = state.revision();

        let n = note(h.user);
        h.store.insert(n.clone()).await;
        settle(&state, base + 1).await;
        assert_eq!(state.unread_count(), 1);

        let mut read = n.clone();
        read.is_read = true;
        h.store.update(read).await.unwrap();
        settle(&state, base + 2).await;
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.len(), 1);

        h.store.remove(n.id).await;
        settle(&state, base + 3).await;
        assert!(state.is_empty());
        assert_eq!(h.notifier.tags(), vec![n.id.to_string()]);
    }

    #[tokio::test]
    async fn test_teardown_cancels_subscription() {
        let h = harness();
        h.listener.start().await.unwrap();
        h.listener.teardown();

        assert_eq!(h.listener.status(), ListenerState::TornDown);
        assert_eq!(h.store.subscriber_count(), 0);

        h.store.insert(note(h.user)).await;
        tokio::task::yield_now().await;
        assert!(h.listener.state().is_empty());
        assert!(h.notifier.shown().is_empty());
        assert!(matches!(
            h.listener.start().await,
            Err(NotificationError::TornDown)
        ));
    }

    #[tokio::test]
    async fn test_feed_closing_mid_session_falls_back_to_fetch_only() {
        let h = harness();
        h.store.seed(vec![note(h.user)]);
        h.listener.start().await.unwrap();
        assert_eq!(h.listener.status(), ListenerState::Live { realtime: true });

        h.store.close_feed();
        wait_for_status(&h.listener, ListenerState::Live { realtime: false }).await;
        assert_eq!(h.store.subscriber_count(), 0);
        assert_eq!(h.listener.state().len(), 1);

        // Missed while not realtime, recovered by refresh without a popup
        let missed = note(h.user);
        h.store.insert(missed.clone()).await;
        tokio::task::yield_now().await;
        assert_eq!(h.listener.state().len(), 1);
        assert_eq!(h.listener.refresh().await.unwrap(), 2);
        assert!(h.listener.state().get(&missed.id).is_some());
        assert!(h.notifier.shown().is_empty());

        // Starting again restores realtime delivery
        h.listener.start().await.unwrap();
        assert_eq!(h.listener.status(), ListenerState::Live { realtime: true });
        let state = h.listener.state().clone();
        let base = state.revision();
        let live = note(h.user);
        h.store.insert(live.clone()).await;
        settle(&state, base + 1).await;
        assert_eq!(h.notifier.tags(), vec![live.id.to_string()]);
    }

    #[tokio::test]
    async fn test_teardown_while_subscribing_aborts_start() {
        let user = Uuid::now_v7();
        let store = InMemoryNotificationStore::new();
        store.seed(vec![note(user)]);
        let gated = Gated::new(store.clone());
        let listener = gated_listener(
            user,
            Arc::new(store.clone()),
            Arc::new(GatedFeed(gated.clone())),
            Arc::new(RecordingNotifier::new()),
        );

        let (started, ()) = tokio::join!(listener.start(), async {
            gated.entered.notified().await;
            listener.teardown();
        });

        assert!(matches!(started, Err(NotificationError::TornDown)));
        assert_eq!(listener.status(), ListenerState::TornDown);
        assert!(listener.state().is_empty());
        assert_eq!(store.fetch_calls(), 0);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_during_initial_fetch_leaves_collection_empty() {
        let user = Uuid::now_v7();
        let store = InMemoryNotificationStore::new();
        store.seed(vec![note(user), note(user)]);
        let gated = Gated::new(store.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let listener = gated_listener(
            user,
            Arc::new(GatedStore(gated.clone())),
            Arc::new(store.clone()),
            notifier.clone(),
        );

        let (started, ()) = tokio::join!(listener.start(), async {
            gated.entered.notified().await;
            listener.teardown();
            gated.release.notify_waiters();
        });

        assert!(matches!(started, Err(NotificationError::TornDown)));
        assert_eq!(listener.status(), ListenerState::TornDown);
        assert!(listener.state().is_empty());

        // The subscription taken before the fetch does not outlive the teardown
        assert_eq!(store.subscriber_count(), 0);
        store.insert(note(user)).await;
        tokio::task::yield_now().await;
        assert!(listener.state().is_empty());
        assert!(notifier.shown().is_empty());
    }
}
