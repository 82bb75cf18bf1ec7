// Postgres LISTEN/NOTIFY change feed
//
// The notifications trigger publishes a small signal (op, id, user_id) for every
// row change on NOTIFY_CHANNEL. Each subscription holds its own listener
// connection, keeps the signals owned by its principal and loads inserted or
// updated rows by id before forwarding them as core change events. The feed
// ends when the connection drops, since signals sent while disconnected are lost.

use async_trait::async_trait;
use cellarclub_core::{ChangeEvent, ChangeFeed, Notification, StoreError, Subscription};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notification_store::store_error;
use crate::repositories::Database;

/// Channel the notifications trigger publishes on (see migrations)
pub const NOTIFY_CHANNEL: &str = "notification_changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Payload of one trigger notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChangeSignal {
    pub op: ChangeOp,
    pub id: Uuid,
    pub user_id: Uuid,
}

/// Decode one notify payload
pub fn parse_signal(payload: &str) -> Result<ChangeSignal, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ============================================================================
// PgChangeFeed
// ============================================================================

#[derive(Clone)]
pub struct PgChangeFeed {
    db: Database,
    buffer: usize,
}

impl PgChangeFeed {
    pub fn new(db: Database) -> Self {
        Self { db, buffer: 256 }
    }

    /// Events buffered per subscription before the forwarder waits
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, user_id: Uuid) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(self.db.pool())
            .await
            .map_err(|e| store_error(e.into()))?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|e| store_error(e.into()))?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        tokio::spawn(forward(
            listener,
            self.db.clone(),
            user_id,
            tx,
            cancel.clone(),
        ));

        debug!(user_id = %user_id, channel = NOTIFY_CHANNEL, "Change feed subscribed");
        Ok(Subscription::new(user_id, rx, cancel))
    }
}

enum Resolved {
    Event(ChangeEvent),
    /// Row deleted before it could be loaded; its delete signal follows
    Gone,
}

/// Turn a signal into the change event the listener folds
async fn resolve(db: &Database, signal: ChangeSignal) -> Result<Resolved, StoreError> {
    let record = match signal.op {
        ChangeOp::Delete => {
            return Ok(Resolved::Event(ChangeEvent::Delete {
                id: signal.id,
                user_id: signal.user_id,
            }))
        }
        ChangeOp::Insert | ChangeOp::Update => {
            match db
                .get_notification(signal.user_id, signal.id)
                .await
                .map_err(store_error)?
            {
                Some(row) => Notification::from(row),
                None => return Ok(Resolved::Gone),
            }
        }
    };

    Ok(Resolved::Event(match signal.op {
        ChangeOp::Insert => ChangeEvent::Insert { record },
        _ => ChangeEvent::Update { record },
    }))
}

async fn forward(
    mut listener: PgListener,
    db: Database,
    user_id: Uuid,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tx.closed() => break,
            received = listener.try_recv() => received,
        };

        let notification = match received {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                warn!(user_id = %user_id, "Change feed connection lost, ending feed");
                break;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Change feed receive failed, ending feed");
                break;
            }
        };

        let signal = match parse_signal(notification.payload()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable change payload");
                continue;
            }
        };
        if signal.user_id != user_id {
            continue;
        }

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            resolved = resolve(&db, signal) => resolved,
        };
        let event = match resolved {
            Ok(Resolved::Event(event)) => event,
            Ok(Resolved::Gone) => {
                debug!(user_id = %user_id, id = %signal.id, "Changed notification already deleted");
                continue;
            }
            Err(e) => {
                // Ending the feed reports the session as no longer realtime
                warn!(user_id = %user_id, id = %signal.id, error = %e, "Change feed row load failed, ending feed");
                break;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(user_id = %user_id, "Change feed forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNAL_MIGRATION: &str =
        include_str!("../migrations/20250315000000_notification_change_signal.sql");

    #[test]
    fn test_parse_signal_from_trigger() {
        // Shape produced by json_build_object('op', lower(TG_OP), 'id', ..., 'user_id', ...)
        let payload = r#"{"op" : "insert", "id" : "0195a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b", "user_id" : "0195a1b2-0000-7000-8000-000000000001"}"#;

        let signal = parse_signal(payload).unwrap();
        assert_eq!(signal.op, ChangeOp::Insert);
        assert_eq!(
            signal.id,
            "0195a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b".parse::<Uuid>().unwrap()
        );
        assert_eq!(
            signal.user_id,
            "0195a1b2-0000-7000-8000-000000000001".parse::<Uuid>().unwrap()
        );

        let delete = r#"{"op":"delete","id":"0195a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b","user_id":"0195a1b2-0000-7000-8000-000000000001"}"#;
        assert_eq!(parse_signal(delete).unwrap().op, ChangeOp::Delete);
    }

    #[test]
    fn test_parse_garbage_is_serialization_error() {
        assert!(matches!(
            parse_signal(r#"{"op":"truncate"}"#),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(
            parse_signal(r#"{"op":"insert","id":"not-a-uuid","user_id":"x"}"#),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_trigger_publishes_on_listened_channel() {
        assert!(SIGNAL_MIGRATION.contains(&format!("pg_notify(\n        '{}'", NOTIFY_CHANNEL)));
    }

    #[test]
    fn test_trigger_payload_does_not_carry_row_contents() {
        // Row contents are unbounded; pg_notify payloads are not
        assert!(!SIGNAL_MIGRATION.contains("row_to_json"));
        assert!(SIGNAL_MIGRATION.contains("'op', lower(TG_OP), 'id', changed.id, 'user_id', changed.user_id"));
    }
}
