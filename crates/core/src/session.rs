// Principal sessions
//
// A `NotificationSession` wires one principal's state, delivery listener,
// reconciler and permission gate together. `SessionManager` keeps at most one
// session alive and swaps it when the authenticated principal changes, so a
// listener never outlives the identity it was started for.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::listener::DeliveryListener;
use crate::permission::PermissionGate;
use crate::reconciler::{Notice, PresentationReconciler};
use crate::state::{ListenerState, NotificationState};
use crate::telemetry::session_span;
use crate::traits::{ChangeFeed, NotificationStore, PermissionProvider, PlatformNotifier};

/// Collaborators shared by every session
#[derive(Clone)]
pub struct NotificationServices {
    pub store: Arc<dyn NotificationStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub notifier: Arc<dyn PlatformNotifier>,
    pub config: NotificationConfig,
}

impl NotificationServices {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        feed: Arc<dyn ChangeFeed>,
        permissions: Arc<dyn PermissionProvider>,
        notifier: Arc<dyn PlatformNotifier>,
    ) -> Self {
        Self {
            store,
            feed,
            permissions,
            notifier,
            config: NotificationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NotificationConfig) -> Self {
        self.config = config;
        self
    }
}

pub struct NotificationSession {
    state: Arc<NotificationState>,
    listener: DeliveryListener,
    reconciler: PresentationReconciler,
    gate: Arc<PermissionGate>,
    notices: broadcast::Sender<Notice>,
    prompt_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationSession {
    /// Build the session and start delivery; see [`NotificationSession::run`]
    pub async fn start(principal: Uuid, services: &NotificationServices) -> Self {
        let session = Self::new(principal, services);
        session.run().await;
        session
    }

    /// Build the session without starting it
    pub fn new(principal: Uuid, services: &NotificationServices) -> Self {
        let state = Arc::new(NotificationState::new(principal));
        let gate = Arc::new(PermissionGate::new(
            services.permissions.clone(),
            services.notifier.clone(),
            services.config.permission_timeout,
        ));
        let (notices, _) = broadcast::channel(services.config.notice_capacity.max(1));
        let listener = DeliveryListener::new(
            state.clone(),
            services.store.clone(),
            services.feed.clone(),
            gate.clone(),
        );
        let reconciler =
            PresentationReconciler::new(state.clone(), services.store.clone(), notices.clone());

        Self {
            state,
            listener,
            reconciler,
            gate,
            notices,
            prompt_task: Mutex::new(None),
        }
    }

    /// Prompt for platform permission in the background and start delivery.
    ///
    /// A failed initial fetch does not fail the session: it is left in
    /// `ListenerState::Error`, an error notice is published and
    /// [`DeliveryListener::refresh`] or [`DeliveryListener::start`] retries.
    pub async fn run(&self) {
        self.spawn_permission_prompt();
        let span = session_span(self.principal());
        if let Err(e) = self.listener.start().instrument(span).await {
            let _ = self
                .notices
                .send(Notice::Error(format!("Could not load notifications: {}", e)));
        }
    }

    fn spawn_permission_prompt(&self) {
        let gate = self.gate.clone();
        let cancel = self.state.cancellation();
        let handle = tokio::spawn(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = gate.ensure_permission() => {}
                }
            }
            .instrument(session_span(self.principal())),
        );
        *self.prompt_task.lock() = Some(handle);
    }

    pub fn principal(&self) -> Uuid {
        self.state.principal()
    }

    pub fn status(&self) -> ListenerState {
        self.state.status()
    }

    pub fn state(&self) -> &Arc<NotificationState> {
        &self.state
    }

    pub fn listener(&self) -> &DeliveryListener {
        &self.listener
    }

    pub fn reconciler(&self) -> &PresentationReconciler {
        &self.reconciler
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Subscribe to transient notices
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Wait for the permission prompt started with the session to finish
    pub async fn permission_settled(&self) {
        let handle = self.prompt_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn teardown(&self) {
        self.listener.teardown();
        if let Some(handle) = self.prompt_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owns the session of the currently authenticated principal
pub struct SessionManager {
    services: NotificationServices,
    current: Option<NotificationSession>,
}

impl SessionManager {
    pub fn new(services: NotificationServices) -> Self {
        Self {
            services,
            current: None,
        }
    }

    pub fn services(&self) -> &NotificationServices {
        &self.services
    }

    pub fn current(&self) -> Option<&NotificationSession> {
        self.current.as_ref()
    }

    /// Follow an authentication change.
    ///
    /// The previous session is torn down before the next one starts; switching
    /// to the same principal keeps the running session. `None` signs out.
    pub async fn switch_principal(&mut self, principal: Option<Uuid>) -> Option<&NotificationSession> {
        let previous = self.current.as_ref().map(|s| s.principal());
        if previous == principal && self.current.is_some() {
            return self.current.as_ref();
        }

        if let Some(session) = self.current.take() {
            session.teardown();
        }
        info!(
            from = ?previous,
            to = ?principal,
            "Notification principal switched"
        );

        if let Some(principal) = principal {
            self.current = Some(NotificationSession::start(principal, &self.services).await);
        }
        self.current.as_ref()
    }

    /// Tear down the current session, if any
    pub fn shutdown(&mut self) {
        if let Some(session) = self.current.take() {
            session.teardown();
        }
    }
}
