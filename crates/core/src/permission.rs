// Permission-gated platform notifications
//
// The gate owns two rules: the user is prompted at most once per gate (one gate per
// principal session) and only from the `Default` state, and a platform popup is
// shown at most once per notification id while permission is granted. The id set
// lives as long as the session and keeps the last EMITTED_CAPACITY ids; older
// duplicates are already filtered by the listener's collection.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::notification::Notification;
use crate::traits::{PermissionProvider, PermissionState, PlatformNotifier};

/// Ids remembered for popup de-duplication
pub const EMITTED_CAPACITY: usize = 1024;

/// Most recently shown ids; the oldest is forgotten once full
#[derive(Default)]
struct EmittedIds {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl EmittedIds {
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > EMITTED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    notifier: Arc<dyn PlatformNotifier>,
    timeout: Duration,
    prompted: AtomicBool,
    emitted: Mutex<EmittedIds>,
}

impl PermissionGate {
    pub fn new(
        provider: Arc<dyn PermissionProvider>,
        notifier: Arc<dyn PlatformNotifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            notifier,
            timeout,
            prompted: AtomicBool::new(false),
            emitted: Mutex::new(EmittedIds::default()),
        }
    }

    pub fn state(&self) -> PermissionState {
        self.provider.current()
    }

    /// Whether this gate already prompted the user
    pub fn has_prompted(&self) -> bool {
        self.prompted.load(Ordering::SeqCst)
    }

    /// Make sure the user was asked for permission.
    ///
    /// Prompts only from `Default` and only once; an unanswered prompt gives up
    /// after the configured timeout and reports `Default`.
    pub async fn ensure_permission(&self) -> PermissionState {
        match self.provider.current() {
            PermissionState::Granted => PermissionState::Granted,
            PermissionState::Denied => {
                tracing::debug!("Platform notifications denied, not prompting");
                PermissionState::Denied
            }
            PermissionState::Default => {
                if self.prompted.swap(true, Ordering::SeqCst) {
                    return PermissionState::Default;
                }
                match tokio::time::timeout(self.timeout, self.provider.request()).await {
                    Ok(state) => {
                        tracing::info!(permission = %state, "Platform notification permission answered");
                        state
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = self.timeout.as_secs(),
                            "Permission prompt unanswered, continuing without platform notifications"
                        );
                        PermissionState::Default
                    }
                }
            }
        }
    }

    /// Show the platform popup for a live insert.
    ///
    /// Returns `true` if a popup was shown.
    pub fn emit(&self, notification: &Notification) -> bool {
        if self.provider.current() != PermissionState::Granted {
            return false;
        }
        if !self.emitted.lock().insert(notification.id) {
            tracing::debug!(id = %notification.id, "Platform notification already shown");
            return false;
        }
        self.notifier.show(&notification.to_platform());
        true
    }
}
