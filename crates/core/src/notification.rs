// Notification domain types
//
// A notification row is immutable once delivered, apart from the `is_read` flag.
// The type only drives presentation (label, icon, route); the core never branches
// on it for delivery behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    /// Admin broadcast or anything without a dedicated category
    General,
    /// A wine order changed status
    OrderStatus,
    /// A new club event was scheduled
    NewEvent,
    /// Monthly wine bonus has not been picked up yet
    BonusReminder,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::General,
        NotificationType::NewEvent,
        NotificationType::OrderStatus,
        NotificationType::BonusReminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::OrderStatus => "order_status",
            Self::NewEvent => "new_event",
            Self::BonusReminder => "bonus_reminder",
        }
    }

    /// Parse a stored type. Unknown categories are shown as general notifications.
    pub fn parse(value: &str) -> Self {
        match value {
            "order_status" => Self::OrderStatus,
            "new_event" => Self::NewEvent,
            "bonus_reminder" => Self::BonusReminder,
            _ => Self::General,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::OrderStatus => "Wine Order",
            Self::NewEvent => "New Event",
            Self::BonusReminder => "Wines of the Month",
            Self::General => "Notification",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::OrderStatus => "📦",
            Self::NewEvent => "📅",
            Self::BonusReminder => "🎁",
            Self::General => "🔔",
        }
    }

    /// Portal page a notification of this type links to
    pub fn route(&self) -> &'static str {
        match self {
            Self::NewEvent => "/events",
            Self::OrderStatus => "/orders",
            Self::BonusReminder | Self::General => "/bonus",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        value.as_str().to_string()
    }
}

/// A notification owned by exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize a draft for one recipient
    pub fn from_draft(user_id: Uuid, draft: &NotificationDraft) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            notification_type: draft.notification_type,
            title: draft.title.clone(),
            message: draft.message.clone(),
            is_read: false,
            related_id: draft.related_id,
            created_at: Utc::now(),
        }
    }

    /// Platform popup for this notification, tagged with its id
    pub fn to_platform(&self) -> PlatformNotification {
        PlatformNotification {
            title: format!(
                "{} {}",
                self.notification_type.icon(),
                self.notification_type.label()
            ),
            body: format!("{}\n{}", self.title, self.message),
            tag: self.id.to_string(),
            icon: PlatformNotification::DEFAULT_ICON.to_string(),
            url: self.notification_type.route().to_string(),
        }
    }
}

/// Out-of-band notification shown by the platform (browser, desktop, terminal)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformNotification {
    pub title: String,
    pub body: String,
    /// De-duplication tag; the platform collapses popups sharing a tag
    pub tag: String,
    pub icon: String,
    pub url: String,
}

impl PlatformNotification {
    pub const DEFAULT_ICON: &'static str = "/favicon.ico";
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English month name for a 1-based month number
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// Content of a notification before it is addressed to recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related_id: Option<Uuid>,
}

impl NotificationDraft {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            related_id: None,
        }
    }

    pub fn general(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationType::General, title, message)
    }

    pub fn new_event(event_title: &str, event_date: &str) -> Self {
        Self::new(
            NotificationType::NewEvent,
            "New Event Added",
            format!(
                "A new event \"{}\" has been scheduled for {}. Don't miss it!",
                event_title, event_date
            ),
        )
    }

    pub fn order_status(order_id: Uuid, wine_name: &str, status: &str) -> Self {
        Self::new(
            NotificationType::OrderStatus,
            "Wine Order Update",
            format!("Your order of {} is now {}.", wine_name, status),
        )
        .with_related(order_id)
    }

    /// Reminder for an unclaimed monthly bonus. `None` for an invalid month.
    pub fn bonus_reminder(month: u32, bonus_id: Uuid) -> Option<Self> {
        let month = month_name(month)?;
        Some(
            Self::new(
                NotificationType::BonusReminder,
                "Wines of the Month Reminder",
                format!(
                    "Don't forget to pick up your {} Wines of the Month at Cabernet Steakhouse!",
                    month
                ),
            )
            .with_related(bonus_id),
        )
    }

    pub fn with_related(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_round_trips_through_storage_strings() {
        for t in NotificationType::ALL {
            assert_eq!(NotificationType::parse(t.as_str()), t);
        }
        assert_eq!(NotificationType::parse("mystery"), NotificationType::General);
    }

    #[test]
    fn test_notification_deserializes_row_json() {
        let id = Uuid::now_v7();
        let user_id = Uuid::now_v7();
        let value = json!({
            "id": id,
            "user_id": user_id,
            "type": "new_event",
            "title": "New Event Added",
            "message": "Tasting night",
            "is_read": false,
            "related_id": null,
            "created_at": "2026-10-01T18:00:00Z"
        });

        let n: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(n.id, id);
        assert_eq!(n.notification_type, NotificationType::NewEvent);
        assert!(!n.is_read);

        let back = serde_json::to_value(&n).unwrap();
        assert_eq!(back["type"], "new_event");
    }

    #[test]
    fn test_platform_notification_is_tagged_by_id() {
        let draft = NotificationDraft::new_event("Harvest Dinner", "October 30");
        let n = Notification::from_draft(Uuid::now_v7(), &draft);
        let popup = n.to_platform();

        assert_eq!(popup.title, "📅 New Event");
        assert_eq!(popup.tag, n.id.to_string());
        assert_eq!(popup.url, "/events");
        assert!(popup.body.starts_with("New Event Added\n"));
        assert!(popup.body.contains("\"Harvest Dinner\""));
    }

    #[test]
    fn test_bonus_reminder_draft() {
        let bonus_id = Uuid::now_v7();
        let draft = NotificationDraft::bonus_reminder(3, bonus_id).unwrap();
        assert_eq!(draft.notification_type, NotificationType::BonusReminder);
        assert_eq!(draft.related_id, Some(bonus_id));
        assert!(draft.message.contains("March Wines of the Month"));

        assert!(NotificationDraft::bonus_reminder(0, bonus_id).is_none());
        assert!(NotificationDraft::bonus_reminder(13, bonus_id).is_none());
    }
}
