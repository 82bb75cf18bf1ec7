// Shared per-principal notification state
//
// One `NotificationState` exists per principal session. The delivery listener
// folds change events into it and the reconciler applies optimistic mutations to
// it. Every write goes through here so that:
// - nothing is applied after teardown (the cancellation token is checked under
//   the collection lock)
// - events arriving while a refresh is in flight are journaled and replayed on
//   top of the fetched rows instead of being lost
// - every change bumps a revision watchers can await

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collection::{NotificationCollection, Page};
use crate::error::{NotificationError, Result};
use crate::notification::Notification;
use crate::traits::{ChangeEvent, NotificationStore};

/// Lifecycle of the delivery listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListenerState {
    Idle,
    Fetching,
    /// Initial fetch done. `realtime` is false when the change feed could not be
    /// established or dropped, i.e. updates only arrive through refresh.
    Live { realtime: bool },
    /// Initial fetch failed; distinct from `Live` with no notifications
    Error { message: String },
    TornDown,
}

impl ListenerState {
    pub fn is_live(&self) -> bool {
        matches!(self, ListenerState::Live { .. })
    }
}

/// Outcome of folding one change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Duplicate,
    Updated,
    Deleted,
    /// Update or delete for an id not held locally, or a row of another user
    Ignored,
    /// Arrived after teardown
    Discarded,
}

impl Applied {
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated | Applied::Deleted)
    }
}

fn fold_into(collection: &mut NotificationCollection, event: &ChangeEvent) -> Applied {
    match event {
        ChangeEvent::Insert { record } => {
            if collection.prepend(record.clone()) {
                Applied::Inserted
            } else {
                Applied::Duplicate
            }
        }
        ChangeEvent::Update { record } => {
            if collection.replace(record.clone()) {
                Applied::Updated
            } else {
                Applied::Ignored
            }
        }
        ChangeEvent::Delete { id, .. } => {
            if collection.remove(id).is_some() {
                Applied::Deleted
            } else {
                Applied::Ignored
            }
        }
    }
}

pub struct NotificationState {
    principal: Uuid,
    collection: RwLock<NotificationCollection>,
    journal: Mutex<Option<Vec<ChangeEvent>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    status: RwLock<ListenerState>,
    revision: watch::Sender<u64>,
    cancel: CancellationToken,
}

impl NotificationState {
    pub fn new(principal: Uuid) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            principal,
            collection: RwLock::new(NotificationCollection::new()),
            journal: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            status: RwLock::new(ListenerState::Idle),
            revision,
            cancel: CancellationToken::new(),
        }
    }

    pub fn principal(&self) -> Uuid {
        self.principal
    }

    pub fn status(&self) -> ListenerState {
        self.status.read().clone()
    }

    pub(crate) fn set_status(&self, status: ListenerState) {
        let mut current = self.status.write();
        // TornDown is terminal
        if *current != ListenerState::TornDown {
            *current = status;
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn tear_down(&self) {
        self.cancel.cancel();
        *self.status.write() = ListenerState::TornDown;
        self.journal.lock().take();
    }

    /// Watch channel bumped on every change to the collection
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn snapshot(&self) -> NotificationCollection {
        self.collection.read().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.collection.read().to_vec()
    }

    pub fn get(&self, id: &Uuid) -> Option<Notification> {
        self.collection.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.collection.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.read().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.collection.read().unread_count()
    }

    pub fn page(&self, page_size: usize, page_number: usize) -> Page {
        self.collection.read().page(page_size, page_number)
    }

    fn journal(&self, events: impl FnOnce() -> Vec<ChangeEvent>) {
        if let Some(journal) = self.journal.lock().as_mut() {
            journal.extend(events());
        }
    }

    /// Fold one change-feed event into the collection
    pub(crate) fn apply_event(&self, event: &ChangeEvent) -> Applied {
        if event.user_id() != self.principal {
            return Applied::Ignored;
        }
        let applied = {
            let mut collection = self.collection.write();
            if self.cancel.is_cancelled() {
                return Applied::Discarded;
            }
            self.journal(|| vec![event.clone()]);
            fold_into(&mut collection, event)
        };
        if applied.changed() {
            self.bump();
        }
        applied
    }

    /// Optimistically flip one read flag; see [`NotificationCollection::mark_read`]
    pub(crate) fn mark_read_local(&self, id: &Uuid) -> Result<Option<bool>> {
        let outcome = {
            let mut collection = self.collection.write();
            if self.cancel.is_cancelled() {
                return Err(NotificationError::TornDown);
            }
            let outcome = collection.mark_read(id);
            if outcome == Some(true) {
                if let Some(record) = collection.get(id).cloned() {
                    self.journal(|| vec![ChangeEvent::Update { record }]);
                }
            }
            outcome
        };
        if outcome == Some(true) {
            self.bump();
        }
        Ok(outcome)
    }

    /// Optimistically mark everything read; returns the ids that flipped
    pub(crate) fn mark_all_read_local(&self) -> Result<Vec<Uuid>> {
        let flipped = {
            let mut collection = self.collection.write();
            if self.cancel.is_cancelled() {
                return Err(NotificationError::TornDown);
            }
            let flipped = collection.mark_all_read();
            let records: Vec<ChangeEvent> = flipped
                .iter()
                .filter_map(|id| collection.get(id).cloned())
                .map(|record| ChangeEvent::Update { record })
                .collect();
            self.journal(|| records);
            flipped
        };
        if !flipped.is_empty() {
            self.bump();
        }
        Ok(flipped)
    }

    /// Remove ids locally, returning the pre-removal snapshot
    pub(crate) fn remove_local(&self, ids: &[Uuid]) -> Result<(NotificationCollection, usize)> {
        let (snapshot, removed) = {
            let mut collection = self.collection.write();
            if self.cancel.is_cancelled() {
                return Err(NotificationError::TornDown);
            }
            let snapshot = collection.clone();
            let removed = collection.remove_many(ids);
            let principal = self.principal;
            self.journal(|| {
                removed
                    .iter()
                    .map(|n| ChangeEvent::Delete {
                        id: n.id,
                        user_id: principal,
                    })
                    .collect()
            });
            (snapshot, removed.len())
        };
        if removed > 0 {
            self.bump();
        }
        Ok((snapshot, removed))
    }

    /// Put a snapshot back verbatim
    pub(crate) fn restore(&self, snapshot: NotificationCollection) -> bool {
        {
            let mut collection = self.collection.write();
            if self.cancel.is_cancelled() {
                return false;
            }
            *collection = snapshot;
        }
        self.bump();
        true
    }

    /// Re-fetch from the store and replace the collection.
    ///
    /// Events and local mutations applied while the fetch is in flight are
    /// replayed on top of the fetched rows. On failure the current collection
    /// is left untouched.
    pub(crate) async fn reconcile(&self, store: &dyn NotificationStore) -> Result<usize> {
        let _refresh = self.refresh_lock.lock().await;
        if self.cancel.is_cancelled() {
            return Err(NotificationError::TornDown);
        }
        *self.journal.lock() = Some(Vec::new());

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.journal.lock().take();
                return Err(NotificationError::TornDown);
            }
            result = store.fetch_for_user(self.principal) => result,
        };

        let rows = match fetched {
            Ok(rows) => rows,
            Err(e) => {
                self.journal.lock().take();
                return Err(NotificationError::Fetch(e));
            }
        };

        let len = {
            let mut collection = self.collection.write();
            let journal = self.journal.lock().take().unwrap_or_default();
            if self.cancel.is_cancelled() {
                return Err(NotificationError::TornDown);
            }
            let mut next = NotificationCollection::from_fetched(
                rows.into_iter()
                    .filter(|n| n.user_id == self.principal)
                    .collect(),
            );
            for event in &journal {
                fold_into(&mut next, event);
            }
            *collection = next;
            collection.len()
        };
        self.bump();
        Ok(len)
    }
}
