// Database models (internal, may differ from core domain types)

use cellarclub_core::{Notification, NotificationDraft, NotificationType};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Notifications
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            notification_type: NotificationType::parse(&row.notification_type),
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            related_id: row.related_id,
            created_at: row.created_at,
        }
    }
}

/// One draft addressed to many recipients, inserted in a single statement
#[derive(Debug, Clone)]
pub struct CreateNotifications {
    pub user_ids: Vec<Uuid>,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
}

impl CreateNotifications {
    pub fn new(draft: &NotificationDraft, user_ids: Vec<Uuid>) -> Self {
        Self {
            user_ids,
            notification_type: draft.notification_type.as_str().to_string(),
            title: draft.title.clone(),
            message: draft.message.clone(),
            related_id: draft.related_id,
        }
    }
}

// ============================================
// Wines of the Month
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct BonusRow {
    pub id: Uuid,
    pub month: i32,
    pub year: i32,
    pub is_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(notification_type: &str) -> NotificationRow {
        NotificationRow {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            notification_type: notification_type.to_string(),
            title: "Order shipped".to_string(),
            message: "Your Malbec is on its way".to_string(),
            is_read: false,
            related_id: Some(Uuid::now_v7()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_converts_to_notification() {
        let row = row("order_status");
        let n: Notification = row.clone().into();
        assert_eq!(n.id, row.id);
        assert_eq!(n.notification_type, NotificationType::OrderStatus);
        assert_eq!(n.related_id, row.related_id);
        assert!(!n.is_read);
    }

    #[test]
    fn test_unknown_type_reads_as_general() {
        let n: Notification = row("tasting_menu").into();
        assert_eq!(n.notification_type, NotificationType::General);
    }

    #[test]
    fn test_create_notifications_copies_draft() {
        let bonus = Uuid::now_v7();
        let draft = NotificationDraft::bonus_reminder(3, bonus).unwrap();
        let users = vec![Uuid::now_v7(), Uuid::now_v7()];
        let input = CreateNotifications::new(&draft, users.clone());

        assert_eq!(input.user_ids, users);
        assert_eq!(input.notification_type, "bonus_reminder");
        assert_eq!(input.related_id, Some(bonus));
        assert!(input.message.contains("March"));
    }
}
