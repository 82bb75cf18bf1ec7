// Notification Core
//
// This crate keeps a member's notification list live and consistent with the
// backing store, independent of which database or UI sits around it.
//
// Key design decisions:
// - Uses traits (NotificationStore, ChangeFeed) for pluggable backends
// - The delivery listener folds change events into shared per-principal state;
//   the presentation reconciler applies optimistic mutations to the same state
// - Platform popups go through a permission gate with its own traits
//   (PermissionProvider, PlatformNotifier) so they can be faked in tests
// - Errors are recovered locally; user-visible failures become transient notices

// Domain types
pub mod collection;
pub mod notification;

pub mod config;
pub mod error;
pub mod traits;

// Delivery and reconciliation
pub mod listener;
pub mod permission;
pub mod reconciler;
pub mod session;
pub mod state;

// Telemetry (tracing-subscriber setup)
pub mod telemetry;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use collection::{NotificationCollection, Page};
pub use config::NotificationConfig;
pub use error::{MutationKind, NotificationError, Result, StoreError};
pub use listener::DeliveryListener;
pub use notification::{
    month_name, Notification, NotificationDraft, NotificationType, PlatformNotification,
};
pub use permission::PermissionGate;
pub use reconciler::{Notice, PendingDelete, PresentationReconciler};
pub use session::{NotificationServices, NotificationSession, SessionManager};
pub use state::{Applied, ListenerState, NotificationState};
pub use traits::{
    ChangeEvent, ChangeFeed, NotificationStore, PermissionProvider, PermissionState,
    PlatformNotifier, Subscription,
};
