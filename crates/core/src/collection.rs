// In-memory notification collection
//
// Order-preserving map keyed by notification id. Display order is held by a rank
// per entry: the initial fetch is ranked 0..n in the order the store returned it
// (created_at descending) and every later insert takes a rank below the current
// front. Insert, update and delete never touch other entries' ranks, so positions
// are stable and all mutations are idempotent by id.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::notification::Notification;

#[derive(Debug, Clone)]
struct Entry {
    rank: i64,
    notification: Notification,
}

/// Ordered, de-duplicated set of notifications for one principal
#[derive(Debug, Clone, Default)]
pub struct NotificationCollection {
    order: BTreeMap<i64, Uuid>,
    entries: HashMap<Uuid, Entry>,
    next_front: i64,
    next_back: i64,
}

impl NotificationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a store fetch that is already ordered newest first.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn from_fetched(notifications: Vec<Notification>) -> Self {
        let mut collection = Self::new();
        for notification in notifications {
            collection.push_back(notification);
        }
        collection
    }

    fn push_back(&mut self, notification: Notification) -> bool {
        if self.entries.contains_key(&notification.id) {
            return false;
        }
        let rank = self.next_back;
        self.next_back += 1;
        if self.order.is_empty() {
            self.next_front = rank - 1;
        }
        self.order.insert(rank, notification.id);
        self.entries.insert(notification.id, Entry { rank, notification });
        true
    }

    /// Put a newly delivered notification at the front.
    ///
    /// Returns `false` (and changes nothing) when the id is already present.
    pub fn prepend(&mut self, notification: Notification) -> bool {
        if self.entries.contains_key(&notification.id) {
            return false;
        }
        let rank = self.next_front;
        self.next_front -= 1;
        if self.order.is_empty() {
            self.next_back = rank + 1;
        }
        self.order.insert(rank, notification.id);
        self.entries.insert(notification.id, Entry { rank, notification });
        true
    }

    /// Replace an existing entry in place. Unknown ids are ignored.
    pub fn replace(&mut self, notification: Notification) -> bool {
        match self.entries.get_mut(&notification.id) {
            Some(entry) => {
                entry.notification = notification;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Notification> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.rank);
        Some(entry.notification)
    }

    /// Remove every listed id that is present; returns the removed entries.
    pub fn remove_many(&mut self, ids: &[Uuid]) -> Vec<Notification> {
        let unique: HashSet<&Uuid> = ids.iter().collect();
        unique.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Set `is_read` on one entry.
    ///
    /// `None` if the id is unknown, `Some(true)` if the flag flipped,
    /// `Some(false)` if it was already read.
    pub fn mark_read(&mut self, id: &Uuid) -> Option<bool> {
        let entry = self.entries.get_mut(id)?;
        let flipped = !entry.notification.is_read;
        entry.notification.is_read = true;
        Some(flipped)
    }

    /// Mark every unread entry read; returns the ids that flipped.
    pub fn mark_all_read(&mut self) -> Vec<Uuid> {
        let mut flipped = Vec::new();
        for entry in self.entries.values_mut() {
            if !entry.notification.is_read {
                entry.notification.is_read = true;
                flipped.push(entry.notification.id);
            }
        }
        flipped
    }

    pub fn get(&self, id: &Uuid) -> Option<&Notification> {
        self.entries.get(id).map(|e| &e.notification)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.notification.is_read)
            .count()
    }

    /// Entries in display order
    pub fn iter(&self) -> impl Iterator<Item = &Notification> + '_ {
        self.order
            .values()
            .filter_map(move |id| self.entries.get(id).map(|e| &e.notification))
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.iter().cloned().collect()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.order.values().copied().collect()
    }

    /// Slice one page out of the collection.
    ///
    /// Pages are 1-based. A page number past the end is clamped to the last page
    /// and page 0 to the first; a page size of 0 is treated as 1.
    pub fn page(&self, page_size: usize, page_number: usize) -> Page {
        let page_size = page_size.max(1);
        let total = self.len();
        let total_pages = total.div_ceil(page_size).max(1);
        let page_number = page_number.clamp(1, total_pages);
        let items = self
            .iter()
            .skip((page_number - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        Page {
            items,
            page_number,
            page_size,
            total_pages,
            total,
        }
    }
}

/// One page of notifications, with the page number actually served
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<Notification>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total: usize,
}

impl Page {
    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationDraft, NotificationType};
    use chrono::{Duration, Utc};

    fn notification(minutes_ago: i64) -> Notification {
        let mut n = Notification::from_draft(
            Uuid::nil(),
            &NotificationDraft::new(NotificationType::General, "t", "m"),
        );
        n.created_at = Utc::now() - Duration::minutes(minutes_ago);
        n
    }

    #[test]
    fn test_from_fetched_keeps_store_order() {
        let fetched: Vec<_> = (0..3).map(notification).collect();
        let ids: Vec<_> = fetched.iter().map(|n| n.id).collect();
        let collection = NotificationCollection::from_fetched(fetched);
        assert_eq!(collection.ids(), ids);
    }

    #[test]
    fn test_prepend_goes_to_front_and_dedups() {
        let mut collection = NotificationCollection::from_fetched(vec![notification(5)]);
        let fresh = notification(0);

        assert!(collection.prepend(fresh.clone()));
        assert!(!collection.prepend(fresh.clone()));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.ids()[0], fresh.id);
    }

    #[test]
    fn test_prepend_into_empty_then_push_back() {
        let mut collection = NotificationCollection::new();
        let first = notification(1);
        let second = notification(0);
        collection.prepend(first.clone());
        collection.prepend(second.clone());
        assert_eq!(collection.ids(), vec![second.id, first.id]);
    }

    #[test]
    fn test_replace_preserves_position() {
        let fetched: Vec<_> = (0..3).map(notification).collect();
        let mut collection = NotificationCollection::from_fetched(fetched.clone());

        let mut updated = fetched[1].clone();
        updated.is_read = true;
        assert!(collection.replace(updated));
        assert_eq!(collection.ids()[1], fetched[1].id);
        assert!(collection.get(&fetched[1].id).unwrap().is_read);

        assert!(!collection.replace(notification(9)));
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_mark_read_outcomes() {
        let n = notification(0);
        let mut collection = NotificationCollection::from_fetched(vec![n.clone()]);

        assert_eq!(collection.mark_read(&n.id), Some(true));
        assert_eq!(collection.mark_read(&n.id), Some(false));
        assert_eq!(collection.mark_read(&Uuid::now_v7()), None);
        assert_eq!(collection.unread_count(), 0);
    }

    #[test]
    fn test_remove_many_ignores_unknown_and_duplicates() {
        let fetched: Vec<_> = (0..4).map(notification).collect();
        let mut collection = NotificationCollection::from_fetched(fetched.clone());

        let removed = collection.remove_many(&[fetched[0].id, fetched[0].id, Uuid::now_v7()]);
        assert_eq!(removed.len(), 1);
        assert_eq!(collection.len(), 3);
        assert!(!collection.contains(&fetched[0].id));
    }

    #[test]
    fn test_page_clamps_past_the_end() {
        let collection = NotificationCollection::from_fetched((0..25).map(notification).collect());

        let third = collection.page(10, 3);
        let fourth = collection.page(10, 4);
        assert_eq!(third, fourth);
        assert_eq!(fourth.page_number, 3);
        assert_eq!(fourth.items.len(), 5);
        assert!(!fourth.has_next());
        assert!(fourth.has_previous());
    }

    #[test]
    fn test_page_of_empty_collection() {
        let page = NotificationCollection::new().page(10, 7);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_page_size_zero_is_one() {
        let collection = NotificationCollection::from_fetched((0..3).map(notification).collect());
        let page = collection.page(0, 2);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_pages, 3);
    }
}
