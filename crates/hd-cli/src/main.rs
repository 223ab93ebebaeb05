mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hd_core::config::Config;
use hd_core::types::{TicketCategory, TicketPriority};
use uuid::Uuid;

use commands::Context;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// helpdesk -- operate the ticket agent's store from the command line.
#[derive(Parser)]
#[command(name = "helpdesk", version, about)]
struct Cli {
    /// Config file (defaults to $HELPDESK_CONFIG or ~/.helpdesk-agent/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding `[store].path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue counts (default when no subcommand is given).
    Status,

    /// Queue a new ticket.
    Enqueue {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },

    /// Show a ticket with its latest decision.
    Show { id: Uuid },

    /// Record a reviewer's correction for a ticket.
    Feedback {
        id: Uuid,
        #[arg(long)]
        category: TicketCategory,
        #[arg(long)]
        priority: TicketPriority,
        #[arg(long)]
        note: Option<String>,
    },

    /// Per-category learned thresholds.
    Policy,

    /// Show or change the global agent settings.
    Settings {
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        auto_assign: Option<bool>,
        #[arg(long)]
        auto_ask: Option<bool>,
    },

    /// Queue the demo tickets if the store is empty.
    Seed,

    /// Run a single agent tick.
    Step,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(db) = &cli.db {
        config.store.path = db.display().to_string();
    }
    // stdout carries the JSON output; keep logs quiet unless RUST_LOG says otherwise
    hd_telemetry::logging::init(&config.general.service_name, "warn", false);

    let ctx = Context::open(&config).await?;
    let output = match cli.command {
        None | Some(Commands::Status) => commands::status::run(&ctx).await?,
        Some(Commands::Enqueue {
            customer,
            subject,
            body,
        }) => commands::tickets::enqueue(&ctx, &customer, &subject, &body).await?,
        Some(Commands::Show { id }) => commands::tickets::show(&ctx, id).await?,
        Some(Commands::Feedback {
            id,
            category,
            priority,
            note,
        }) => commands::feedback::run(&ctx, id, category, priority, note).await?,
        Some(Commands::Policy) => commands::policy::list(&ctx).await?,
        Some(Commands::Settings {
            threshold,
            auto_assign,
            auto_ask,
        }) => commands::policy::settings(&ctx, threshold, auto_assign, auto_ask).await?,
        Some(Commands::Seed) => commands::tickets::seed(&ctx).await?,
        Some(Commands::Step) => commands::tickets::step(&ctx).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
