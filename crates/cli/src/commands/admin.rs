// Admin commands - produce notifications and maintain the table

use anyhow::{bail, Result};
use cellarclub_core::{Notification, NotificationDraft, NotificationType};
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::context::Context;
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Notification type (general, order_status, new_event, bonus_reminder)
    #[arg(long = "type", default_value = "general")]
    pub notification_type: String,

    /// Title
    #[arg(long)]
    pub title: String,

    /// Message body
    #[arg(long)]
    pub message: String,

    /// Related order, event or bonus ID
    #[arg(long)]
    pub related: Option<Uuid>,

    /// Recipients (repeatable)
    #[arg(long = "to", conflicts_with = "all")]
    pub to: Vec<Uuid>,

    /// Send to every approved member
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct SendResult {
    sent: usize,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct CountResult {
    count: u64,
}

fn parse_type(value: &str) -> Result<NotificationType> {
    NotificationType::ALL
        .into_iter()
        .find(|t| t.as_str() == value)
        .ok_or_else(|| anyhow::anyhow!("unknown notification type: {}", value))
}

pub async fn send(ctx: &Context, output: OutputFormat, quiet: bool, args: SendArgs) -> Result<()> {
    if !args.all && args.to.is_empty() {
        bail!("pass --to <USER_ID> or --all");
    }
    let mut draft = NotificationDraft::new(parse_type(&args.notification_type)?, args.title, args.message);
    if let Some(related) = args.related {
        draft = draft.with_related(related);
    }

    let publisher = ctx.publisher();
    let notifications = if args.all {
        publisher.send_to_all_members(&draft).await?
    } else {
        publisher.send_to_users(&draft, &args.to).await?
    };
    let result = SendResult {
        sent: notifications.len(),
        notifications,
    };

    if output.is_text() {
        if quiet {
            println!("{}", result.sent);
            return Ok(());
        }
        println!("Sent {} notifications", result.sent);
        if !result.notifications.is_empty() {
            print_table_header(&[("ID", 36), ("USER", 36)]);
            for n in &result.notifications {
                print_table_row(&[(&n.id.to_string(), 36), (&n.user_id.to_string(), 36)]);
            }
        }
    } else {
        output.print_value(&result)?;
    }
    Ok(())
}

fn print_count(output: OutputFormat, count: u64, text: String) -> Result<()> {
    if output.is_text() {
        println!("{}", text);
        Ok(())
    } else {
        output.print_value(&CountResult { count })
    }
}

pub async fn event(ctx: &Context, output: OutputFormat, title: String, date: String) -> Result<()> {
    let sent = ctx.publisher().notify_new_event(&title, &date).await?;
    print_count(
        output,
        sent as u64,
        format!("Announced \"{}\" to {} members", title, sent),
    )
}

pub async fn remind(ctx: &Context, output: OutputFormat, month: u32, year: i32) -> Result<()> {
    let sent = ctx.publisher().notify_bonus_reminder(month, year).await?;
    let text = if sent == 0 {
        format!("No reminders sent for {}/{}", month, year)
    } else {
        format!("Reminded {} members", sent)
    };
    print_count(output, sent as u64, text)
}

pub async fn prune(ctx: &Context, output: OutputFormat, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(ctx.config.retention_days);
    let deleted = ctx.publisher().prune_expired(days).await?;
    if output.is_text() {
        print_field("Retention", &format!("{} days", days));
    }
    print_count(
        output,
        deleted,
        format!("Deleted {} expired notifications", deleted),
    )
}

pub async fn migrate(ctx: &Context, quiet: bool) -> Result<()> {
    ctx.db.migrate().await?;
    if !quiet {
        println!("Migrations applied");
    }
    Ok(())
}
