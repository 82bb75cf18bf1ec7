// Presentation Reconciler
//
// Derives display state from the shared collection and runs user mutations with
// optimistic local application:
// - read-state changes are monotonic and idempotent, so a failed remote call is
//   reported but not rolled back; the next refresh reconciles
// - deletes are not idempotent from the user's point of view, so they hold a
//   snapshot and restore it verbatim if the remote call fails

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collection::{NotificationCollection, Page};
use crate::error::{MutationKind, NotificationError, Result};
use crate::notification::Notification;
use crate::state::NotificationState;
use crate::traits::NotificationStore;

/// Transient user-facing message (toast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Info(String),
    Error(String),
}

/// Optimistic delete awaiting the remote result
#[must_use = "a pending delete must be committed or rolled back"]
pub struct PendingDelete<'a> {
    state: &'a NotificationState,
    snapshot: NotificationCollection,
    removed: usize,
}

impl<'a> PendingDelete<'a> {
    /// Snapshot the collection and remove `ids` from the local view
    pub fn begin(state: &'a NotificationState, ids: &[Uuid]) -> Result<Self> {
        let (snapshot, removed) = state.remove_local(ids)?;
        Ok(Self {
            state,
            snapshot,
            removed,
        })
    }

    /// Number of entries removed locally
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Remote delete succeeded; drop the snapshot
    pub fn commit(self) -> usize {
        self.removed
    }

    /// Remote delete failed; put the pre-delete collection back
    pub fn rollback(self) -> bool {
        self.state.restore(self.snapshot)
    }
}

pub struct PresentationReconciler {
    state: Arc<NotificationState>,
    store: Arc<dyn NotificationStore>,
    notices: broadcast::Sender<Notice>,
}

impl PresentationReconciler {
    pub fn new(
        state: Arc<NotificationState>,
        store: Arc<dyn NotificationStore>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            state,
            store,
            notices,
        }
    }

    pub fn principal(&self) -> Uuid {
        self.state.principal()
    }

    /// Subscribe to transient notices
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: Notice) {
        // No receivers just means nobody is showing toasts
        let _ = self.notices.send(notice);
    }

    pub fn unread_count(&self) -> usize {
        self.state.unread_count()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.notifications()
    }

    /// One page of the current collection; see [`NotificationCollection::page`]
    pub fn paginate(&self, page_size: usize, page_number: usize) -> Page {
        self.state.page(page_size, page_number)
    }

    /// Mark one notification read.
    ///
    /// The local flag flips before the remote call. Already-read or unknown ids
    /// are a no-op without a round trip.
    pub async fn mark_read(&self, id: Uuid) -> Result<()> {
        match self.state.mark_read_local(&id)? {
            Some(true) => {}
            Some(false) => {
                debug!(id = %id, "Notification already read");
                return Ok(());
            }
            None => {
                debug!(id = %id, "Mark read for unknown notification ignored");
                return Ok(());
            }
        }

        if let Err(e) = self.store.mark_read(self.principal(), id).await {
            let err = NotificationError::mutation(MutationKind::MarkRead, e);
            warn!(user_id = %self.principal(), id = %id, error = %err, "Mark read failed, will reconcile on next refresh");
            self.notify(Notice::Error("Could not mark notification as read".into()));
            return Err(err);
        }
        Ok(())
    }

    /// Mark every unread notification read in one remote call.
    ///
    /// Returns how many entries flipped locally.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let flipped = self.state.mark_all_read_local()?;

        match self.store.mark_all_read(self.principal()).await {
            Ok(rows) => {
                debug!(user_id = %self.principal(), local = flipped.len(), rows, "Marked all notifications read");
                Ok(flipped.len())
            }
            Err(e) => {
                let err = NotificationError::mutation(MutationKind::MarkAllRead, e);
                warn!(user_id = %self.principal(), error = %err, "Mark all read failed, will reconcile on next refresh");
                self.notify(Notice::Error(
                    "Could not mark notifications as read".into(),
                ));
                Err(err)
            }
        }
    }

    /// Delete notifications with optimistic removal and rollback.
    ///
    /// Whatever the remote outcome, the collection is re-fetched afterwards so
    /// changes made on the server during the round trip are picked up.
    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let pending = PendingDelete::begin(&self.state, ids)?;

        let result = match self.store.delete_many(self.principal(), ids).await {
            Ok(rows) => {
                let removed = pending.commit();
                debug!(user_id = %self.principal(), removed, rows, "Deleted notifications");
                self.notify(Notice::Info(if removed == 1 {
                    "Notification deleted".to_string()
                } else {
                    format!("{} notifications deleted", removed)
                }));
                Ok(removed)
            }
            Err(e) => {
                let err = NotificationError::mutation(MutationKind::Delete, e);
                warn!(user_id = %self.principal(), count = ids.len(), error = %err, "Delete failed, restoring notifications");
                pending.rollback();
                self.notify(Notice::Error("Could not delete notifications".into()));
                Err(err)
            }
        };

        match self.state.reconcile(self.store.as_ref()).await {
            Ok(_) | Err(NotificationError::TornDown) => {}
            Err(e) => {
                warn!(user_id = %self.principal(), error = %e, "Post-delete reconciliation failed");
            }
        }
        result
    }

    /// Re-fetch from the store
    pub async fn refresh(&self) -> Result<usize> {
        self.state.reconcile(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNotificationStore;
    use crate::notification::NotificationDraft;
    use chrono::{Duration, Utc};

    async fn setup(count: usize) -> (InMemoryNotificationStore, PresentationReconciler, Vec<Notification>) {
        let user = Uuid::now_v7();
        let store = InMemoryNotificationStore::new();
        let rows: Vec<Notification> = (0..count)
            .map(|i| {
                let mut n = Notification::from_draft(user, &NotificationDraft::general("t", "m"));
                n.created_at = Utc::now() - Duration::minutes(i as i64);
                n
            })
            .collect();
        store.seed(rows.clone());

        let state = Arc::new(NotificationState::new(user));
        state.reconcile(&store).await.unwrap();
        let (tx, _) = broadcast::channel(8);
        let reconciler = PresentationReconciler::new(state, Arc::new(store.clone()), tx);
        (store, reconciler, rows)
    }

    #[tokio::test]
    async fn test_mark_read_is_optimistic_and_idempotent() {
        let (store, reconciler, rows) = setup(3).await;

        reconciler.mark_read(rows[0].id).await.unwrap();
        assert_eq!(reconciler.unread_count(), 2);
        reconciler.mark_read(rows[0].id).await.unwrap();
        assert_eq!(reconciler.unread_count(), 2);
        assert_eq!(store.mark_read_calls(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_failure_keeps_flag_and_notifies() {
        let (store, reconciler, rows) = setup(2).await;
        let mut notices = reconciler.notices();
        store.fail_mutations(true);

        let err = reconciler.mark_read(rows[1].id).await.unwrap_err();
        assert!(matches!(
            err,
            NotificationError::Mutation {
                operation: MutationKind::MarkRead,
                ..
            }
        ));
        assert_eq!(reconciler.unread_count(), 1);
        assert!(matches!(notices.try_recv().unwrap(), Notice::Error(_)));
    }

    #[tokio::test]
    async fn test_mark_all_read_is_one_round_trip() {
        let (store, reconciler, _) = setup(5).await;

        assert_eq!(reconciler.mark_all_read().await.unwrap(), 5);
        assert_eq!(reconciler.unread_count(), 0);
        assert_eq!(store.mark_all_read_calls(), 1);
        assert_eq!(store.mark_read_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_success_reconciles() {
        let (store, reconciler, rows) = setup(4).await;
        let fetches = store.fetch_calls();

        let removed = reconciler
            .delete_many(&[rows[0].id, rows[2].id])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(reconciler.notifications().len(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.fetch_calls(), fetches + 1);
    }

    #[tokio::test]
    async fn test_delete_failure_restores_snapshot() {
        let (store, reconciler, rows) = setup(4).await;
        reconciler.mark_read(rows[3].id).await.unwrap();
        let before = reconciler.notifications();
        store.fail_mutations(true);

        assert!(reconciler
            .delete_many(&[rows[0].id, rows[1].id])
            .await
            .is_err());
        assert_eq!(reconciler.notifications(), before);
    }

    #[tokio::test]
    async fn test_pending_delete_rollback_without_refetch() {
        let (_store, reconciler, rows) = setup(3).await;
        let before = reconciler.notifications();

        let pending = PendingDelete::begin(&reconciler.state, &[rows[1].id]).unwrap();
        assert_eq!(pending.removed(), 1);
        assert_eq!(reconciler.notifications().len(), 2);
        assert!(pending.rollback());
        assert_eq!(reconciler.notifications(), before);
    }

    #[tokio::test]
    async fn test_delete_nothing_is_free() {
        let (store, reconciler, _) = setup(1).await;
        assert_eq!(reconciler.delete_many(&[]).await.unwrap(), 0);
        assert_eq!(store.delete_calls(), 0);
    }
}
