// Notification producers
//
// Admin-side operations that create notification rows. Delivery to members who
// are signed in happens through the notifications trigger and the change feed.

use anyhow::{bail, Result};
use cellarclub_core::{Notification, NotificationDraft};
use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::models::CreateNotifications;
use crate::repositories::Database;

/// Creation time before which notifications are pruned
///
/// `None` when the horizon reaches before the earliest timestamp Postgres can
/// store (4714 BC), in which case nothing is old enough to prune.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(retention_days))
        .and_then(|horizon| now.checked_sub_signed(horizon))
        .filter(|cutoff| cutoff.year() > -4713)
}

#[derive(Clone)]
pub struct NotificationPublisher {
    db: Database,
}

impl NotificationPublisher {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Address one draft to the listed users
    pub async fn send_to_users(
        &self,
        draft: &NotificationDraft,
        user_ids: &[Uuid],
    ) -> Result<Vec<Notification>> {
        let mut recipients = user_ids.to_vec();
        recipients.sort();
        recipients.dedup();

        let rows = self
            .db
            .create_notifications(CreateNotifications::new(draft, recipients))
            .await?;

        info!(
            notification_type = %draft.notification_type,
            recipients = rows.len(),
            "Notifications sent"
        );
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    /// Address one draft to every approved member
    pub async fn send_to_all_members(&self, draft: &NotificationDraft) -> Result<Vec<Notification>> {
        let members = self.db.list_approved_member_ids().await?;
        self.send_to_users(draft, &members).await
    }

    /// Announce a newly scheduled club event to all approved members
    pub async fn notify_new_event(&self, event_title: &str, event_date: &str) -> Result<usize> {
        let draft = NotificationDraft::new_event(event_title, event_date);
        Ok(self.send_to_all_members(&draft).await?.len())
    }

    /// Remind approved members who have not claimed this month's wines.
    ///
    /// Returns 0 without sending anything when no bonus is available for the
    /// month.
    pub async fn notify_bonus_reminder(&self, month: u32, year: i32) -> Result<usize> {
        if !(1..=12).contains(&month) {
            bail!("month must be between 1 and 12, got {}", month);
        }
        let Some(bonus) = self.db.get_available_bonus(month, year).await? else {
            info!(month, year, "No available bonus, skipping reminder");
            return Ok(0);
        };

        let unclaimed = self.db.list_unclaimed_member_ids(bonus.id).await?;
        if unclaimed.is_empty() {
            info!(month, year, "Every member claimed the bonus, skipping reminder");
            return Ok(0);
        }

        let Some(draft) = NotificationDraft::bonus_reminder(month, bonus.id) else {
            bail!("month must be between 1 and 12, got {}", month);
        };
        Ok(self.send_to_users(&draft, &unclaimed).await?.len())
    }

    /// Retention sweep; returns the number of rows deleted
    pub async fn prune_expired(&self, retention_days: u32) -> Result<u64> {
        let Some(cutoff) = retention_cutoff(Utc::now(), retention_days) else {
            info!(retention_days, "Retention horizon predates any notification, nothing to prune");
            return Ok(0);
        };
        let deleted = self.db.delete_notifications_before(cutoff).await?;
        info!(retention_days, deleted, cutoff = %cutoff, "Pruned expired notifications");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            retention_cutoff(now, 30),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(retention_cutoff(now, 0), Some(now));
    }

    #[test]
    fn test_retention_cutoff_beyond_calendar_range() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, u32::MAX), None);
        assert_eq!(retention_cutoff(now, 3_000_000), None);

        let ancient = retention_cutoff(now, 365 * 4_000).unwrap();
        assert!(ancient.year() < -1900);
    }
}
