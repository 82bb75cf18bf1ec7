// Member inbox commands - list, read, delete and watch one member's notifications

use anyhow::{bail, Context as _, Result};
use cellarclub_core::{
    Notice, Notification, NotificationSession, PermissionState, PresentationReconciler,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::context::Context;
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Debug, Serialize)]
struct UnreadSummary {
    user_id: Uuid,
    unread: usize,
    total: usize,
}

#[derive(Debug, Serialize)]
struct MutationSummary {
    user_id: Uuid,
    changed: usize,
    unread: usize,
}

/// Load a member's notifications without subscribing or prompting
async fn open(ctx: &Context, user: Uuid) -> Result<NotificationSession> {
    let session = NotificationSession::new(user, &ctx.services(PermissionState::Denied));
    session
        .listener()
        .refresh()
        .await
        .context("failed to load notifications")?;
    Ok(session)
}

fn summary(reconciler: &PresentationReconciler) -> UnreadSummary {
    UnreadSummary {
        user_id: reconciler.principal(),
        unread: reconciler.unread_count(),
        total: reconciler.notifications().len(),
    }
}

fn print_notifications(items: &[Notification]) {
    print_table_header(&[("ID", 36), ("", 1), ("TYPE", 18), ("TITLE", 32), ("CREATED", 16)]);
    for n in items {
        print_table_row(&[
            (&n.id.to_string(), 36),
            (if n.is_read { " " } else { "*" }, 1),
            (n.notification_type.label(), 18),
            (&n.title, 32),
            (&n.created_at.format("%Y-%m-%d %H:%M").to_string(), 16),
        ]);
    }
}

pub async fn list(
    ctx: &Context,
    output: OutputFormat,
    user: Uuid,
    page: usize,
    page_size: Option<usize>,
) -> Result<()> {
    let session = open(ctx, user).await?;
    let page_size = page_size.unwrap_or(ctx.config.page_size);
    let page = session.reconciler().paginate(page_size, page);

    if output.is_text() {
        if page.items.is_empty() {
            println!("No notifications");
            return Ok(());
        }
        print_notifications(&page.items);
        println!();
        println!(
            "Page {} of {} ({} notifications, {} unread)",
            page.page_number,
            page.total_pages,
            page.total,
            session.reconciler().unread_count()
        );
    } else {
        output.print_value(&page)?;
    }
    Ok(())
}

pub async fn unread(ctx: &Context, output: OutputFormat, quiet: bool, user: Uuid) -> Result<()> {
    let session = open(ctx, user).await?;
    let summary = summary(session.reconciler());

    if output.is_text() {
        if quiet {
            println!("{}", summary.unread);
        } else {
            print_field("Unread", &summary.unread.to_string());
            print_field("Total", &summary.total.to_string());
        }
    } else {
        output.print_value(&summary)?;
    }
    Ok(())
}

pub async fn read(ctx: &Context, output: OutputFormat, user: Uuid, id: Uuid) -> Result<()> {
    let session = open(ctx, user).await?;
    let Some(notification) = session.state().get(&id) else {
        bail!("Notification not found: {}", id);
    };

    let reconciler = session.reconciler();
    reconciler.mark_read(id).await?;
    let result = MutationSummary {
        user_id: user,
        changed: usize::from(!notification.is_read),
        unread: reconciler.unread_count(),
    };

    if output.is_text() {
        if notification.is_read {
            println!("Already read: {}", id);
        } else {
            println!("Marked read: {}", id);
        }
        print_field("Unread", &result.unread.to_string());
    } else {
        output.print_value(&result)?;
    }
    Ok(())
}

pub async fn read_all(ctx: &Context, output: OutputFormat, user: Uuid) -> Result<()> {
    let session = open(ctx, user).await?;
    let reconciler = session.reconciler();
    let changed = reconciler.mark_all_read().await?;
    let result = MutationSummary {
        user_id: user,
        changed,
        unread: reconciler.unread_count(),
    };

    if output.is_text() {
        println!("Marked {} notifications read", changed);
    } else {
        output.print_value(&result)?;
    }
    Ok(())
}

pub async fn delete(ctx: &Context, output: OutputFormat, user: Uuid, ids: Vec<Uuid>) -> Result<()> {
    let session = open(ctx, user).await?;
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| session.state().get(id).is_none())
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        bail!("Notification not found: {}", missing.join(", "));
    }

    let reconciler = session.reconciler();
    let changed = reconciler.delete_many(&ids).await?;
    let result = MutationSummary {
        user_id: user,
        changed,
        unread: reconciler.unread_count(),
    };

    if output.is_text() {
        println!("Deleted {} notifications", changed);
    } else {
        output.print_value(&result)?;
    }
    Ok(())
}

/// Follow a member's notifications until Ctrl-C
pub async fn watch(
    ctx: &Context,
    output: OutputFormat,
    user: Uuid,
    permission: PermissionState,
) -> Result<()> {
    let session = NotificationSession::new(user, &ctx.services(permission));
    let mut notices = session.notices();
    let mut changes = session.state().changes();
    session.run().await;

    if output.is_text() {
        print_field("User", &user.to_string());
        print_field("Status", &format!("{:?}", session.status()));
        print_field("Unread", &session.reconciler().unread_count().to_string());
        println!("Watching for notifications, Ctrl-C to stop");
    } else {
        output.print_value(&summary(session.reconciler()))?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_unread = session.reconciler().unread_count();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let unread = session.reconciler().unread_count();
                if unread == last_unread {
                    continue;
                }
                last_unread = unread;
                if output.is_text() {
                    print_field("Unread", &unread.to_string());
                } else {
                    output.print_value(&summary(session.reconciler()))?;
                }
            }
            notice = notices.recv() => match notice {
                Ok(Notice::Info(message)) => eprintln!("{}", message),
                Ok(Notice::Error(message)) => eprintln!("error: {}", message),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.teardown();
    Ok(())
}
