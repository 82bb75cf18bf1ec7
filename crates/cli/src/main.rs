// Cellarclub CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Talk to Postgres directly through cellarclub-storage; member
// commands run the same session code a portal would.

mod commands;
mod context;
mod output;
mod platform;

use anyhow::Result;
use cellarclub_core::telemetry::{init_telemetry, TelemetryConfig};
use cellarclub_core::{NotificationConfig, PermissionState};
use cellarclub_storage::StorageConfig;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cellarclub")]
#[command(about = "Cellarclub CLI - Deliver and manage member notifications")]
#[command(version)]
pub struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Member whose notifications to act on
    #[arg(long, short, global = true, env = "CELLARCLUB_USER_ID")]
    pub user: Option<Uuid>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a member's notifications live
    Watch {
        /// Initial platform permission
        #[arg(
            long,
            env = "CELLARCLUB_PERMISSION",
            default_value = "default",
            value_parser = ["default", "granted", "denied"]
        )]
        permission: String,
    },

    /// List a member's notifications, newest first
    List {
        /// Page number (clamped to the last page)
        #[arg(long, short, default_value = "1")]
        page: usize,

        /// Notifications per page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show the unread count
    Unread,

    /// Mark one notification read
    Read {
        /// Notification ID
        id: Uuid,
    },

    /// Mark all notifications read
    ReadAll,

    /// Delete notifications
    Delete {
        /// Notification IDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },

    /// Send a notification to members
    Send(commands::admin::SendArgs),

    /// Announce a new club event to all approved members
    Event {
        /// Event title
        #[arg(long)]
        title: String,

        /// Event date as shown to members
        #[arg(long)]
        date: String,
    },

    /// Remind members who have not picked up this month's wines
    Remind {
        /// Month (1-12)
        #[arg(long)]
        month: u32,

        /// Year
        #[arg(long)]
        year: i32,
    },

    /// Delete notifications past the retention horizon
    Prune {
        /// Retention in days (default: CELLARCLUB_RETENTION_DAYS)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Apply database migrations
    Migrate,
}

fn require_user(user: Option<Uuid>) -> Result<Uuid> {
    user.ok_or_else(|| anyhow::anyhow!("--user (or CELLARCLUB_USER_ID) is required"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _telemetry = init_telemetry(TelemetryConfig::from_env());

    let storage = StorageConfig::new(cli.database_url.clone());
    let ctx = context::Context::connect(storage, NotificationConfig::from_env()).await?;
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Watch { permission } => {
            let permission = PermissionState::parse(&permission).unwrap_or(PermissionState::Default);
            commands::inbox::watch(&ctx, output_format, require_user(cli.user)?, permission).await
        }
        Commands::List { page, page_size } => {
            commands::inbox::list(&ctx, output_format, require_user(cli.user)?, page, page_size)
                .await
        }
        Commands::Unread => {
            commands::inbox::unread(&ctx, output_format, cli.quiet, require_user(cli.user)?).await
        }
        Commands::Read { id } => {
            commands::inbox::read(&ctx, output_format, require_user(cli.user)?, id).await
        }
        Commands::ReadAll => {
            commands::inbox::read_all(&ctx, output_format, require_user(cli.user)?).await
        }
        Commands::Delete { ids } => {
            commands::inbox::delete(&ctx, output_format, require_user(cli.user)?, ids).await
        }
        Commands::Send(args) => commands::admin::send(&ctx, output_format, cli.quiet, args).await,
        Commands::Event { title, date } => {
            commands::admin::event(&ctx, output_format, title, date).await
        }
        Commands::Remind { month, year } => {
            commands::admin::remind(&ctx, output_format, month, year).await
        }
        Commands::Prune { days } => commands::admin::prune(&ctx, output_format, days).await,
        Commands::Migrate => commands::admin::migrate(&ctx, cli.quiet).await,
    }
}
